//! In-memory fakes of the store and fetch interfaces for engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use postwatch_core::{
    Comment, CommentKey, CommentResult, CommentStore, Cookie, CookieStore, CredentialStatus,
    FanOutWriter, FetchAdapter, FetchError, Link, LinkId, LinkStatus, LinkStore, LinkType, Proxy,
    ProxyStore, ResolvedProfile, StoreError, Token, TokenStore,
};

use crate::ingest::{CommentIngestor, FanOutWrites};
use crate::rotator::CredentialRotator;
use crate::worker::WorkerDeps;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct FakeFailure(pub &'static str);

pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_550_400 + secs, 0).unwrap()
}

pub(crate) fn link(id: LinkId, post_id: &str, link_type: LinkType) -> Link {
    Link {
        id,
        owner_id: 100 + id,
        raw_url: format!("https://www.facebook.com/posts/{id}"),
        name: None,
        post_id: Some(post_id.to_string()),
        post_id_v1: None,
        link_type,
        status: LinkStatus::Started,
        resolved: true,
        delay_secs: 10,
        last_comment_time: None,
        hidden: false,
    }
}

pub(crate) fn unresolved(id: LinkId, raw_url: &str) -> Link {
    Link {
        raw_url: raw_url.to_string(),
        post_id: None,
        link_type: LinkType::Unresolved,
        resolved: false,
        ..link(id, "", LinkType::Unresolved)
    }
}

pub(crate) fn comment(
    comment_id: &str,
    author_id: &str,
    created_at: DateTime<Utc>,
) -> CommentResult {
    CommentResult {
        external_comment_id: comment_id.to_string(),
        message: Some(format!("message for {comment_id}")),
        phone_number: None,
        external_author_id: author_id.to_string(),
        author_name: Some("Commenter".to_string()),
        created_at,
    }
}

pub(crate) fn proxy(id: i64) -> Proxy {
    Proxy {
        id,
        address: format!("http://10.0.0.{id}:3128"),
        status: CredentialStatus::Active,
    }
}

pub(crate) fn token(id: i64, status: CredentialStatus, retry_count: i32) -> Token {
    Token {
        id,
        value: format!("token-{id}"),
        status,
        retry_count,
    }
}

pub(crate) fn cookie(id: i64) -> Cookie {
    Cookie {
        id,
        value: format!("c_user={id}"),
        status: CredentialStatus::Active,
    }
}

/// Yields enough times for spawned tasks to reach their next await point.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub links: Mutex<BTreeMap<LinkId, Link>>,
    pub comments: Mutex<Vec<Comment>>,
    pub tokens: Mutex<Vec<Token>>,
    pub cookies: Mutex<Vec<Cookie>>,
    pub proxies: Mutex<Vec<Proxy>>,
    pub fail_link_reads: AtomicBool,
    pub panic_link_lookups: AtomicBool,
    pub fail_link_saves: AtomicBool,
    pub fail_comment_saves: AtomicBool,
    pub link_saves: AtomicI64,
    pub fan_out_saves: AtomicI64,
    next_comment_id: AtomicI64,
}

impl MemoryStore {
    pub fn with_links(links: impl IntoIterator<Item = Link>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.links.lock().unwrap();
            for l in links {
                map.insert(l.id, l);
            }
        }
        Arc::new(store)
    }

    pub fn link(&self, id: LinkId) -> Option<Link> {
        self.links.lock().unwrap().get(&id).cloned()
    }

    pub fn put_link(&self, link: Link) {
        self.links.lock().unwrap().insert(link.id, link);
    }

    pub fn set_status(&self, id: LinkId, status: LinkStatus) {
        if let Some(l) = self.links.lock().unwrap().get_mut(&id) {
            l.status = status;
        }
    }

    pub fn remove_link(&self, id: LinkId) {
        self.links.lock().unwrap().remove(&id);
    }

    pub fn comments_for(&self, link_id: LinkId) -> Vec<Comment> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.link_id == link_id)
            .cloned()
            .collect()
    }

    fn store_links(&self, links: &[Link]) {
        let mut map = self.links.lock().unwrap();
        for l in links {
            // Rows deleted since they were read are not recreated.
            if let Some(existing) = map.get_mut(&l.id) {
                *existing = l.clone();
            }
        }
    }

    fn store_comments(&self, comments: &[Comment]) {
        let mut rows = self.comments.lock().unwrap();
        for c in comments {
            let position = rows
                .iter()
                .position(|r| (r.id.is_some() && r.id == c.id) || r.key() == c.key());
            match position {
                Some(i) => {
                    let id = rows[i].id;
                    rows[i] = Comment { id, ..c.clone() };
                }
                None => {
                    let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst) + 1;
                    rows.push(Comment {
                        id: Some(id),
                        ..c.clone()
                    });
                }
            }
        }
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn find_eligible_for_polling(&self) -> Result<Vec<Link>, StoreError> {
        if self.fail_link_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend(FakeFailure("link reads disabled")));
        }
        Ok(self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.is_eligible_for_polling())
            .cloned()
            .collect())
    }

    async fn find_eligible_for_resolution(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.is_eligible_for_resolution())
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        assert!(
            !self.panic_link_lookups.load(Ordering::SeqCst),
            "link lookup panicked"
        );
        if self.fail_link_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend(FakeFailure("link reads disabled")));
        }
        Ok(self.link(id))
    }

    async fn find_by_shared_post_id(&self, post_id: &str) -> Result<Vec<Link>, StoreError> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.post_id.as_deref() == Some(post_id) && l.status == LinkStatus::Started)
            .cloned()
            .collect())
    }

    async fn save_many(&self, links: &[Link]) -> Result<(), StoreError> {
        if self.fail_link_saves.load(Ordering::SeqCst) {
            return Err(StoreError::backend(FakeFailure("link saves disabled")));
        }
        self.link_saves.fetch_add(1, Ordering::SeqCst);
        self.store_links(links);
        Ok(())
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn find_by_natural_key(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.key() == key)
            .cloned())
    }

    async fn save_many(&self, comments: &[Comment]) -> Result<(), StoreError> {
        if self.fail_comment_saves.load(Ordering::SeqCst) {
            return Err(StoreError::backend(FakeFailure("comment saves disabled")));
        }
        self.store_comments(comments);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn find_one_active(&self) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.status == CredentialStatus::Active)
            .cloned())
    }

    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Token>, StoreError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn save_many(&self, tokens: &[Token]) -> Result<(), StoreError> {
        let mut rows = self.tokens.lock().unwrap();
        for t in tokens {
            if let Some(existing) = rows.iter_mut().find(|r| r.id == t.id) {
                *existing = t.clone();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CookieStore for MemoryStore {
    async fn find_one_active(&self) -> Result<Option<Cookie>, StoreError> {
        Ok(self
            .cookies
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.status == CredentialStatus::Active)
            .cloned())
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Proxy>, StoreError> {
        Ok(self
            .proxies
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FanOutWriter for MemoryStore {
    async fn save_fan_out(&self, comments: &[Comment], links: &[Link]) -> Result<(), StoreError> {
        if self.fail_comment_saves.load(Ordering::SeqCst)
            || self.fail_link_saves.load(Ordering::SeqCst)
        {
            return Err(StoreError::backend(FakeFailure("fan-out rolled back")));
        }
        self.fan_out_saves.fetch_add(1, Ordering::SeqCst);
        self.store_comments(comments);
        self.store_links(links);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchCall {
    Public(String),
    Cookie(String),
    Token(String),
    Profile(String),
    Alternate(String),
}

/// Scripted fetch adapter. Responses are keyed by the identity passed in.
#[derive(Default)]
pub(crate) struct FakeFetch {
    pub public: Mutex<HashMap<String, CommentResult>>,
    pub cookie: Mutex<HashMap<String, CommentResult>>,
    pub token: Mutex<HashMap<String, CommentResult>>,
    pub profiles: Mutex<HashMap<String, ResolvedProfile>>,
    pub profile_delays: Mutex<HashMap<String, Duration>>,
    pub alternates: Mutex<HashMap<String, String>>,
    pub fail_public: AtomicBool,
    pub fail_cookie: AtomicBool,
    pub calls: Mutex<Vec<FetchCall>>,
}

impl FakeFetch {
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&FetchCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: FetchCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FetchAdapter for FakeFetch {
    async fn fetch_public_comment(
        &self,
        encoded_post_id: &str,
        _proxy: &Proxy,
    ) -> Result<Option<CommentResult>, FetchError> {
        self.record(FetchCall::Public(encoded_post_id.to_string()));
        if self.fail_public.load(Ordering::SeqCst) {
            return Err(FetchError::UnexpectedStatus {
                status: 502,
                url: "fake://public".to_string(),
            });
        }
        Ok(self.public.lock().unwrap().get(encoded_post_id).cloned())
    }

    async fn fetch_private_comment_by_cookie(
        &self,
        _proxy: &Proxy,
        _cookie: &Cookie,
        post_identity: &str,
    ) -> Result<Option<CommentResult>, FetchError> {
        self.record(FetchCall::Cookie(post_identity.to_string()));
        if self.fail_cookie.load(Ordering::SeqCst) {
            return Err(FetchError::UnexpectedStatus {
                status: 403,
                url: "fake://cookie".to_string(),
            });
        }
        Ok(self.cookie.lock().unwrap().get(post_identity).cloned())
    }

    async fn fetch_private_comment_by_token(
        &self,
        post_id: &str,
        _proxy: &Proxy,
        _token: &Token,
    ) -> Result<Option<CommentResult>, FetchError> {
        self.record(FetchCall::Token(post_id.to_string()));
        Ok(self.token.lock().unwrap().get(post_id).cloned())
    }

    async fn resolve_profile(
        &self,
        raw_url: &str,
        _proxy: &Proxy,
        _token: &Token,
    ) -> Result<Option<ResolvedProfile>, FetchError> {
        self.record(FetchCall::Profile(raw_url.to_string()));
        let delay = self.profile_delays.lock().unwrap().get(raw_url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.profiles.lock().unwrap().get(raw_url).cloned())
    }

    async fn resolve_alternate_post_id(
        &self,
        raw_url: &str,
    ) -> Result<Option<String>, FetchError> {
        self.record(FetchCall::Alternate(raw_url.to_string()));
        Ok(self.alternates.lock().unwrap().get(raw_url).cloned())
    }
}

pub(crate) fn rotator(store: &Arc<MemoryStore>) -> Arc<CredentialRotator> {
    Arc::new(CredentialRotator::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ))
}

pub(crate) fn ingestor(store: &Arc<MemoryStore>) -> Arc<CommentIngestor> {
    Arc::new(CommentIngestor::new(
        store.clone(),
        store.clone(),
        FanOutWrites::Independent,
    ))
}

pub(crate) fn worker_deps(
    store: &Arc<MemoryStore>,
    fetch: &Arc<FakeFetch>,
    no_credential_delay: Duration,
) -> Arc<WorkerDeps> {
    Arc::new(WorkerDeps {
        links: store.clone(),
        fetch: fetch.clone(),
        rotator: rotator(store),
        ingestor: ingestor(store),
        no_credential_delay,
    })
}
