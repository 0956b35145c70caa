//! Directory connection management.
//!
//! [`DirectoryConnection`] is the seam between the provider and a protocol
//! library: operations are issued immediately and return a message id,
//! responses are collected later through [`DirectoryConnection::poll`],
//! which never blocks.
//!
//! [`Ldap3Connection`] implements it with `ldap3`. Each operation runs as
//! a task on a private tokio runtime and pushes its responses into a
//! channel that `poll` drains one message at a time.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use ldap3::asn1::StructureTag;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{DerefPolicy, DirectoryConfig};
use crate::error::{LdapError, LdapResult};
use crate::filter;
use crate::message::{
    DirectoryEntry, MessageBody, MessageId, PollOutcome, ProtocolMessage, ResultStatus,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UNBIND_TIMEOUT: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

/// Parameters of one search operation.
///
/// Searches are always subtree searches from `base`.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams<'a> {
    /// Base DN.
    pub base: &'a str,
    /// Search filter.
    pub filter: &'a str,
    /// Attributes to return.
    pub attributes: &'a [String],
    /// Server-side time limit; zero means none.
    pub timeout: Duration,
    /// Server-side size limit; zero means none.
    pub max_results: u32,
    /// Alias dereferencing policy.
    pub deref: DerefPolicy,
    /// Return attribute names only.
    pub types_only: bool,
}

impl<'a> SearchParams<'a> {
    /// Builds parameters for `filter` from the configuration.
    #[must_use]
    pub fn new(config: &'a DirectoryConfig, filter: &'a str) -> Self {
        Self {
            base: &config.base_object,
            filter,
            attributes: &config.attributes,
            timeout: config.timeout,
            max_results: config.max_results,
            deref: config.deref_aliases,
            types_only: false,
        }
    }
}

/// A stateful, multiplexed connection to a directory server.
pub trait DirectoryConnection: Send {
    /// Issues a simple bind. Empty credentials bind anonymously.
    fn bind(&mut self, bind_dn: &str, password: &str) -> LdapResult<MessageId>;

    /// Issues a search.
    ///
    /// Fails synchronously if the operation cannot be started. The returned
    /// id is distinct from every other operation still in flight.
    fn search(&mut self, params: &SearchParams<'_>) -> LdapResult<MessageId>;

    /// Returns the next available message batch without blocking.
    fn poll(&mut self) -> PollOutcome;

    /// Stops tracking an operation. Later responses to it may still arrive.
    fn abandon(&mut self, msgid: MessageId);

    /// Closes the connection. Idempotent.
    fn unbind(&mut self);

    /// Identifies the connection in diagnostic output.
    fn identity(&self) -> String;
}

// ============================================================================
// ldap3 backend
// ============================================================================

/// `ldap3` connection driven by a private tokio runtime.
pub struct Ldap3Connection {
    id: Uuid,
    server: String,
    runtime: Option<Runtime>,
    ldap: Ldap,
    driver: JoinHandle<()>,
    sender: mpsc::UnboundedSender<ProtocolMessage>,
    receiver: mpsc::UnboundedReceiver<ProtocolMessage>,
    operations: HashMap<MessageId, JoinHandle<()>>,
    last_id: MessageId,
}

impl Ldap3Connection {
    /// Connects to the configured server.
    ///
    /// This is the only blocking call: it waits for the transport (and
    /// StartTLS, when enabled) to be established. Protocol version 3 is
    /// always used.
    pub fn initialize(config: &DirectoryConfig) -> LdapResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("lc-ldap-io")
            .enable_all()
            .build()
            .map_err(|e| LdapError::Internal(format!("failed to start I/O runtime: {e}")))?;

        let settings = LdapConnSettings::new()
            .set_conn_timeout(CONNECT_TIMEOUT)
            .set_starttls(config.use_tls && !config.is_ldaps());

        let (conn, ldap) = runtime
            .block_on(LdapConnAsync::with_settings(settings, &config.server))
            .map_err(|e| LdapError::Connection(format!("{}: {e}", config.server)))?;

        let driver = runtime.spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!("LDAP connection driver error: {}", e);
            }
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        tracing::info!(connection = %id, server = %config.server, "LDAP connection initialized");

        Ok(Self {
            id,
            server: config.server.clone(),
            runtime: Some(runtime),
            ldap,
            driver,
            sender,
            receiver,
            operations: HashMap::new(),
            last_id: 0,
        })
    }

    /// Allocates the next message id: never 0, never one still in flight.
    fn next_id(&mut self) -> MessageId {
        loop {
            self.last_id = if self.last_id == MessageId::MAX {
                1
            } else {
                self.last_id + 1
            };
            if !self.operations.contains_key(&self.last_id) {
                return self.last_id;
            }
        }
    }

    fn spawn<F, Fut>(&mut self, task: F) -> LdapResult<MessageId>
    where
        F: FnOnce(MessageId, Ldap, mpsc::UnboundedSender<ProtocolMessage>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = self
            .runtime
            .as_ref()
            .map(|runtime| runtime.handle().clone())
            .ok_or_else(|| LdapError::connection("connection is closed"))?;
        let msgid = self.next_id();
        let handle = runtime.spawn(task(msgid, self.ldap.clone(), self.sender.clone()));
        self.operations.insert(msgid, handle);
        Ok(msgid)
    }
}

async fn run_bind(
    msgid: MessageId,
    mut ldap: Ldap,
    sender: mpsc::UnboundedSender<ProtocolMessage>,
    bind_dn: String,
    password: String,
) {
    let status = match ldap.simple_bind(&bind_dn, &password).await {
        Ok(result) => ResultStatus::from(result),
        Err(e) => ResultStatus::local_error(e.to_string()),
    };
    let _ = sender.send(ProtocolMessage::new(msgid, MessageBody::Bind(status)));
}

async fn run_search(
    msgid: MessageId,
    mut ldap: Ldap,
    sender: mpsc::UnboundedSender<ProtocolMessage>,
    request: OwnedSearch,
) {
    let send = |body: MessageBody| {
        let _ = sender.send(ProtocolMessage::new(msgid, body));
    };

    ldap.with_search_options(request.options);
    if !request.timeout.is_zero() {
        ldap.with_timeout(request.timeout);
    }

    let mut stream = match ldap
        .streaming_search(
            &request.base,
            Scope::Subtree,
            &request.filter,
            request.attributes.clone(),
        )
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            send(MessageBody::SearchResult(ResultStatus::local_error(e.to_string())));
            return;
        }
    };

    loop {
        match stream.next().await {
            Ok(Some(entry)) => {
                let body = if entry.is_ref() {
                    MessageBody::SearchReference(referral_urls(entry.0))
                } else if entry.is_intermediate() {
                    MessageBody::Intermediate
                } else {
                    MessageBody::SearchEntry(DirectoryEntry::from_search_entry(
                        SearchEntry::construct(entry),
                        &request.attributes,
                    ))
                };
                send(body);
            }
            Ok(None) => break,
            Err(e) => {
                send(MessageBody::SearchResult(ResultStatus::local_error(e.to_string())));
                return;
            }
        }
    }

    let status = ResultStatus::from(stream.finish().await);
    send(MessageBody::SearchResult(status));
}

/// URLs carried by a search result reference.
///
/// Malformed elements are skipped.
fn referral_urls(reference: StructureTag) -> Vec<String> {
    reference
        .expect_constructed()
        .unwrap_or_default()
        .into_iter()
        .filter_map(StructureTag::expect_primitive)
        .filter_map(|url| String::from_utf8(url).ok())
        .collect()
}

/// Search parameters moved into the operation task.
struct OwnedSearch {
    base: String,
    filter: String,
    attributes: Vec<String>,
    timeout: Duration,
    options: SearchOptions,
}

impl OwnedSearch {
    fn new(params: &SearchParams<'_>) -> Self {
        let options = SearchOptions::new()
            .deref(params.deref.to_ldap3())
            .typesonly(params.types_only)
            .sizelimit(i32::try_from(params.max_results).unwrap_or(i32::MAX))
            .timelimit(i32::try_from(params.timeout.as_secs()).unwrap_or(i32::MAX));

        Self {
            base: params.base.to_string(),
            filter: params.filter.to_string(),
            attributes: params.attributes.to_vec(),
            timeout: params.timeout,
            options,
        }
    }
}

impl DirectoryConnection for Ldap3Connection {
    fn bind(&mut self, bind_dn: &str, password: &str) -> LdapResult<MessageId> {
        let bind_dn = bind_dn.to_string();
        let password = password.to_string();
        self.spawn(move |msgid, ldap, sender| run_bind(msgid, ldap, sender, bind_dn, password))
    }

    fn search(&mut self, params: &SearchParams<'_>) -> LdapResult<MessageId> {
        // ldap3 only parses the filter inside the task; reject it here.
        filter::check_syntax(params.filter)?;
        let request = OwnedSearch::new(params);
        self.spawn(move |msgid, ldap, sender| run_search(msgid, ldap, sender, request))
    }

    fn poll(&mut self) -> PollOutcome {
        match self.receiver.try_recv() {
            Ok(message) => {
                if message.is_terminal() {
                    self.operations.remove(&message.id);
                }
                PollOutcome::Ready(vec![message])
            }
            Err(mpsc::error::TryRecvError::Empty) => {
                if self.driver.is_finished() && !self.operations.is_empty() {
                    PollOutcome::TransientError(LdapError::connection(
                        "connection driver stopped",
                    ))
                } else {
                    PollOutcome::Empty
                }
            }
            Err(mpsc::error::TryRecvError::Disconnected) => {
                PollOutcome::TransientError(LdapError::connection("result channel closed"))
            }
        }
    }

    fn abandon(&mut self, msgid: MessageId) {
        if let Some(task) = self.operations.remove(&msgid) {
            task.abort();
            tracing::debug!(msgid, "Abandoned LDAP operation");
        }
    }

    fn unbind(&mut self) {
        for (_, task) in self.operations.drain() {
            task.abort();
        }

        let Some(runtime) = self.runtime.take() else {
            return;
        };

        let mut ldap = self.ldap.clone();
        let result = runtime.block_on(async move {
            tokio::time::timeout(UNBIND_TIMEOUT, ldap.unbind()).await
        });
        match result {
            Ok(Ok(())) => tracing::debug!(connection = %self.id, "LDAP connection unbound"),
            Ok(Err(e)) => tracing::warn!(connection = %self.id, "LDAP unbind failed: {}", e),
            Err(_) => tracing::warn!(connection = %self.id, "LDAP unbind timed out"),
        }

        self.driver.abort();
        runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    }

    fn identity(&self) -> String {
        format!("ldap3:{}@{}", self.id, self.server)
    }
}

impl Drop for Ldap3Connection {
    fn drop(&mut self) {
        self.unbind();
    }
}
