//! LDAP contact provider.
//!
//! Owns the directory connection, the configuration block and the
//! registry of in-flight searches. All progress happens inside
//! [`LdapContactProvider::iterate`], which the host calls on a fixed
//! cadence and which never blocks.
//!
//! ## Security Requirements
//!
//! - Passwords are never logged
//! - The diagnostic dump redacts the bind password

use std::fmt::{self, Write as _};
use std::sync::Arc;

use lc_provider::{
    AddressParser, ConfigStore, ContactProvider, ProviderResult, SearchCallback, SearchHandle,
};
use uuid::Uuid;

use crate::config::{AuthMethod, DirectoryConfig};
use crate::connection::{DirectoryConnection, Ldap3Connection, SearchParams};
use crate::error::{LdapError, LdapResult};
use crate::filter;
use crate::mapper::ContactMapper;
use crate::message::{MessageBody, MessageId, MessageKind, PollOutcome, ProtocolMessage};
use crate::registry::RequestRegistry;
use crate::search::SearchRequest;

/// Provider type identifier.
pub const PROVIDER_TYPE: &str = "ldap";

/// Number of concurrent searches above which a warning is logged.
///
/// Searches beyond it are still accepted.
pub const MAX_RUNNING_REQUESTS: usize = 10;

/// Bind progress of the provider's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// No bind issued.
    Disconnected,
    /// Bind issued, result not yet seen.
    BindPending,
    /// Bind succeeded.
    Bound,
    /// Bind rejected. Searches still run.
    BindFailed,
}

impl BindState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::BindPending => "bind-pending",
            Self::Bound => "bound",
            Self::BindFailed => "bind-failed",
        }
    }
}

impl fmt::Display for BindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact provider backed by an LDAP directory.
pub struct LdapContactProvider<C: DirectoryConnection = Ldap3Connection> {
    /// Provider ID.
    id: Uuid,

    /// Connection, exclusively owned.
    connection: C,

    /// Current configuration block.
    config: Arc<DirectoryConfig>,

    /// Entry to contact mapper for the current configuration.
    mapper: ContactMapper,

    /// Host address parser.
    parser: Box<dyn AddressParser>,

    bind_state: BindState,
    pending_bind: Option<MessageId>,

    /// In-flight searches.
    registry: RequestRegistry,
}

impl LdapContactProvider<Ldap3Connection> {
    /// Creates a provider from the host configuration store.
    ///
    /// Connects to the server before returning; this is the only blocking
    /// step. The bind is issued but completes later, during
    /// [`iterate`](Self::iterate).
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The server cannot be reached
    pub fn new(store: &dyn ConfigStore, parser: Box<dyn AddressParser>) -> LdapResult<Self> {
        Self::with_config(DirectoryConfig::from_store(store), parser)
    }

    /// Creates a provider from an explicit configuration block.
    pub fn with_config(config: DirectoryConfig, parser: Box<dyn AddressParser>) -> LdapResult<Self> {
        config.validate()?;
        let connection = Ldap3Connection::initialize(&config)?;
        Ok(Self::with_connection(config, connection, parser))
    }
}

impl<C: DirectoryConnection> LdapContactProvider<C> {
    /// Creates a provider over an already initialized connection and
    /// issues the bind.
    ///
    /// The configuration is expected to be validated.
    pub fn with_connection(
        config: DirectoryConfig,
        connection: C,
        parser: Box<dyn AddressParser>,
    ) -> Self {
        let mut provider = Self {
            id: Uuid::now_v7(),
            connection,
            mapper: ContactMapper::from_config(&config),
            config: Arc::new(config),
            parser,
            bind_state: BindState::Disconnected,
            pending_bind: None,
            registry: RequestRegistry::new(),
        };

        provider.bind();

        tracing::info!(
            provider = %provider.id,
            server = %provider.config.server,
            auth_method = %provider.config.auth_method,
            "LDAP contact provider created"
        );

        provider
    }

    /// Returns the provider ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns the bind state.
    #[must_use]
    pub const fn bind_state(&self) -> BindState {
        self.bind_state
    }

    /// Whether the bind completed successfully.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bind_state == BindState::Bound
    }

    /// Returns the message id of the bind awaiting its result.
    #[must_use]
    pub const fn pending_bind(&self) -> Option<MessageId> {
        self.pending_bind
    }

    /// Returns the number of pending searches.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the registry of pending searches.
    #[must_use]
    pub const fn requests(&self) -> &RequestRegistry {
        &self.registry
    }

    fn bind(&mut self) {
        let config = Arc::clone(&self.config);
        let (bind_dn, password) = match config.auth_method {
            AuthMethod::Anonymous => ("", ""),
            AuthMethod::Plain => (config.username.as_str(), config.password.as_str()),
            AuthMethod::Sasl => {
                tracing::debug!("SASL bind not implemented, skipping bind");
                return;
            }
        };

        match self.connection.bind(bind_dn, password) {
            Ok(msgid) => {
                tracing::debug!(msgid, auth_method = %config.auth_method, "LDAP bind issued");
                self.pending_bind = Some(msgid);
                self.bind_state = BindState::BindPending;
            }
            Err(e) => {
                tracing::error!("LDAP bind could not be issued: {}", e);
                self.bind_state = BindState::BindFailed;
            }
        }
    }

    /// Starts a search for `predicate`.
    ///
    /// The predicate is substituted verbatim into the filter template, so
    /// users may type their own wildcards. On failure nothing is
    /// registered and the callback is dropped uncalled.
    pub fn submit(&mut self, predicate: &str, callback: SearchCallback) -> LdapResult<SearchHandle> {
        let config = Arc::clone(&self.config);
        let filter = filter::build_filter(&config.filter, predicate);

        let msgid = match self.connection.search(&SearchParams::new(&config, &filter)) {
            Ok(msgid) => msgid,
            Err(e) => {
                tracing::warn!(predicate, "LDAP search could not be started: {}", e);
                return Err(e);
            }
        };

        let request = SearchRequest::new(msgid, predicate, filter, callback);
        let handle = match self.registry.insert(request) {
            Ok(handle) => handle,
            Err(e) => {
                // The id still belongs to the earlier request; leave its
                // operation alone.
                tracing::error!(msgid, "LDAP search rejected: {}", e);
                return Err(e);
            }
        };

        if self.registry.len() > MAX_RUNNING_REQUESTS {
            tracing::warn!(
                pending = self.registry.len(),
                max = MAX_RUNNING_REQUESTS,
                "Too many concurrent LDAP searches"
            );
        }

        tracing::info!(msgid, request = %handle.token(), predicate, "LDAP search created");
        Ok(handle)
    }

    /// Cancels the search designated by `handle`.
    ///
    /// Only the exact request the handle was issued for is cancelled; a
    /// later request that reuses the message id is left alone. Its
    /// callback never fires.
    pub fn cancel(&mut self, handle: SearchHandle) -> LdapResult<()> {
        match self.registry.remove_exact(&handle) {
            Some(request) => {
                self.connection.abandon(request.msgid());
                tracing::info!(
                    msgid = request.msgid(),
                    request = %request.token(),
                    found = request.found_count(),
                    "LDAP search cancelled"
                );
                Ok(())
            }
            None => {
                tracing::warn!(
                    msgid = handle.msgid(),
                    request = %handle.token(),
                    "Cancel for unknown LDAP search"
                );
                Err(LdapError::RequestNotFound(handle.msgid()))
            }
        }
    }

    /// Advances pending work by one poll of the connection.
    ///
    /// Returns immediately when no search and no bind is pending.
    pub fn iterate(&mut self) {
        if self.registry.is_empty() && self.pending_bind.is_none() {
            return;
        }

        match self.connection.poll() {
            PollOutcome::Empty => {}
            PollOutcome::TransientError(e) => {
                tracing::warn!("LDAP poll failed, retrying on next tick: {}", e);
            }
            PollOutcome::Ready(batch) => self.dispatch(batch),
        }
    }

    /// Routes one message batch by the kind and id of its first message.
    ///
    /// Batches are assumed to belong to a single operation: every message
    /// is handed to the request owning the first message's id.
    fn dispatch(&mut self, batch: Vec<ProtocolMessage>) {
        let Some(first) = batch.first() else {
            return;
        };
        let msgid = first.id;

        match first.kind() {
            MessageKind::Bind => {
                if let Some(message) = batch.into_iter().next() {
                    self.handle_bind(message);
                }
            }
            kind if kind.is_search() => self.dispatch_search(msgid, batch),
            _ => {
                tracing::warn!(msgid, count = batch.len(), "Ignoring unexpected LDAP message");
            }
        }
    }

    fn handle_bind(&mut self, message: ProtocolMessage) {
        let MessageBody::Bind(status) = message.body else {
            return;
        };

        if self.pending_bind != Some(message.id) {
            tracing::error!(
                msgid = message.id,
                expected = self.pending_bind.unwrap_or(0),
                "LDAP bind result does not match the pending bind"
            );
            return;
        }

        self.pending_bind = None;
        if status.is_success() {
            self.bind_state = BindState::Bound;
            tracing::info!(msgid = message.id, "LDAP bind completed");
        } else {
            self.bind_state = BindState::BindFailed;
            tracing::error!(msgid = message.id, code = status.code, "LDAP bind rejected: {}", status);
        }
    }

    fn dispatch_search(&mut self, msgid: MessageId, batch: Vec<ProtocolMessage>) {
        let Some(request) = self.registry.get_mut(msgid) else {
            tracing::warn!(msgid, count = batch.len(), "LDAP response for unknown search, dropping");
            return;
        };

        for message in batch {
            if message.id != msgid {
                tracing::debug!(msgid, other = message.id, "Batch mixes message ids");
            }
            if request.is_complete() {
                tracing::debug!(msgid, "Ignoring LDAP message after search result");
                continue;
            }

            match message.body {
                MessageBody::SearchEntry(entry) => {
                    if let Some(contact) = self.mapper.map_entry(&entry, self.parser.as_ref()) {
                        request.push_contact(contact);
                    }
                }
                MessageBody::SearchReference(urls) => {
                    tracing::debug!(msgid, ?urls, "Ignoring search reference");
                }
                MessageBody::Intermediate | MessageBody::Extended => {
                    tracing::debug!(msgid, "Ignoring intermediate LDAP response");
                }
                MessageBody::SearchResult(status) => {
                    if !status.is_success() {
                        tracing::warn!(msgid, code = status.code, "LDAP search ended with error: {}", status);
                    }
                    request.complete(status);
                }
                MessageBody::Bind(_) | MessageBody::Other(_) => {
                    tracing::warn!(msgid, "Unexpected LDAP message in search batch");
                }
            }
        }

        if request.is_complete() {
            if let Some(request) = self.registry.remove(msgid) {
                tracing::info!(
                    msgid,
                    request = %request.token(),
                    count = request.found_count(),
                    "LDAP search completed"
                );
                request.deliver();
            }
        }
    }

    /// Replaces the configuration block.
    ///
    /// Pending searches keep their filters. The connection and bind are
    /// not re-established.
    pub fn reload_config(&mut self, store: &dyn ConfigStore) -> LdapResult<()> {
        let config = DirectoryConfig::from_store(store);
        config.validate()?;

        self.mapper = ContactMapper::from_config(&config);
        self.config = Arc::new(config);

        tracing::info!(provider = %self.id, "LDAP configuration reloaded");
        Ok(())
    }

    /// Returns a human-readable dump of the provider state.
    #[must_use]
    pub fn describe(&self) -> String {
        let config = &self.config;
        let password = if config.password.is_empty() {
            "<empty>"
        } else {
            "<redacted>"
        };

        let mut out = String::new();
        let _ = writeln!(out, "LDAP contact provider {}", self.id);
        let _ = writeln!(out, "  connection:      {}", self.connection.identity());
        let _ = writeln!(out, "  bind state:      {}", self.bind_state);
        let _ = writeln!(out, "  pending bind id: {}", self.pending_bind.unwrap_or(0));
        let _ = writeln!(out, "  pending searches: {}", self.registry.len());
        let _ = writeln!(out, "  config:");
        let _ = writeln!(out, "    server:         {}", config.server);
        let _ = writeln!(out, "    use_tls:        {}", config.use_tls);
        let _ = writeln!(out, "    auth_method:    {}", config.auth_method);
        let _ = writeln!(out, "    username:       {}", config.username);
        let _ = writeln!(out, "    password:       {password}");
        let _ = writeln!(out, "    base_object:    {}", config.base_object);
        let _ = writeln!(out, "    filter:         {}", config.filter);
        let _ = writeln!(out, "    timeout:        {}s", config.timeout.as_secs());
        let _ = writeln!(out, "    max_results:    {}", config.max_results);
        let _ = writeln!(
            out,
            "    deref_aliases:  {} ({:?})",
            config.deref_aliases.as_int(),
            config.deref_aliases
        );
        let _ = writeln!(out, "    name_attribute: {}", config.name_attribute);
        let _ = writeln!(out, "    sip_attribute:  {}", config.sip_attribute);
        let _ = writeln!(out, "  attributes:");
        for attr in &config.attributes {
            let _ = writeln!(out, "    {attr}");
        }
        if !self.registry.is_empty() {
            let _ = writeln!(out, "  searches:");
            for request in self.registry.iter() {
                let _ = writeln!(
                    out,
                    "    #{} filter={} found={}",
                    request.msgid(),
                    request.filter(),
                    request.found_count()
                );
            }
        }
        out
    }
}

impl<C: DirectoryConnection> Drop for LdapContactProvider<C> {
    fn drop(&mut self) {
        let pending = self.registry.drain();
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Releasing pending LDAP searches");
        }
        for request in pending {
            self.connection.abandon(request.msgid());
        }
        self.connection.unbind();
        tracing::debug!(provider = %self.id, "LDAP contact provider destroyed");
    }
}

impl<C: DirectoryConnection> ContactProvider for LdapContactProvider<C> {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn begin_search(
        &mut self,
        predicate: &str,
        callback: SearchCallback,
    ) -> ProviderResult<SearchHandle> {
        self.submit(predicate, callback).map_err(Into::into)
    }

    fn cancel_search(&mut self, handle: SearchHandle) -> ProviderResult<()> {
        self.cancel(handle).map_err(Into::into)
    }

    fn iterate(&mut self) {
        Self::iterate(self);
    }

    fn pending_count(&self) -> usize {
        Self::pending_count(self)
    }

    fn describe(&self) -> String {
        Self::describe(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Mutex, MutexGuard};

    use lc_provider::{Contact, MemoryConfigStore, ProviderError, SipAddressParser};

    use super::*;
    use crate::config::CONFIG_SECTION;
    use crate::filter::FILTER_MAX_LEN;
    use crate::message::{DirectoryEntry, ResultStatus};

    // ------------------------------------------------------------------
    // Scripted connection
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct Script {
        last_id: MessageId,
        forced_ids: VecDeque<MessageId>,
        outcomes: VecDeque<PollOutcome>,
        reject_bind: bool,
        reject_search: bool,
        binds: Vec<(String, String)>,
        filters: Vec<String>,
        abandoned: Vec<MessageId>,
        unbinds: usize,
        polls: usize,
    }

    impl Script {
        fn allocate(&mut self) -> MessageId {
            self.forced_ids.pop_front().unwrap_or_else(|| {
                self.last_id += 1;
                self.last_id
            })
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedConnection(Arc<Mutex<Script>>);

    impl ScriptedConnection {
        fn script(&self) -> MutexGuard<'_, Script> {
            self.0.lock().unwrap()
        }

        fn push(&self, batch: Vec<ProtocolMessage>) {
            self.script().outcomes.push_back(PollOutcome::Ready(batch));
        }

        fn push_error(&self) {
            self.script()
                .outcomes
                .push_back(PollOutcome::TransientError(LdapError::connection("reset")));
        }

        fn force_id(&self, msgid: MessageId) {
            self.script().forced_ids.push_back(msgid);
        }
    }

    impl DirectoryConnection for ScriptedConnection {
        fn bind(&mut self, bind_dn: &str, password: &str) -> LdapResult<MessageId> {
            let mut script = self.script();
            if script.reject_bind {
                return Err(LdapError::connection("server busy"));
            }
            script.binds.push((bind_dn.to_string(), password.to_string()));
            Ok(script.allocate())
        }

        fn search(&mut self, params: &SearchParams<'_>) -> LdapResult<MessageId> {
            filter::check_syntax(params.filter)?;
            let mut script = self.script();
            if script.reject_search {
                return Err(LdapError::connection("resource exhausted"));
            }
            script.filters.push(params.filter.to_string());
            Ok(script.allocate())
        }

        fn poll(&mut self) -> PollOutcome {
            let mut script = self.script();
            script.polls += 1;
            script.outcomes.pop_front().unwrap_or(PollOutcome::Empty)
        }

        fn abandon(&mut self, msgid: MessageId) {
            self.script().abandoned.push(msgid);
        }

        fn unbind(&mut self) {
            self.script().unbinds += 1;
        }

        fn identity(&self) -> String {
            "scripted".to_string()
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    type Deliveries = Arc<Mutex<Vec<Vec<Contact>>>>;

    fn collector() -> (Deliveries, SearchCallback) {
        let deliveries: Deliveries = Arc::default();
        let sink = Arc::clone(&deliveries);
        let callback: SearchCallback = Box::new(move |contacts: Vec<Contact>| sink.lock().unwrap().push(contacts));
        (deliveries, callback)
    }

    fn provider_with(
        config: DirectoryConfig,
        connection: &ScriptedConnection,
    ) -> LdapContactProvider<ScriptedConnection> {
        LdapContactProvider::with_connection(
            config,
            connection.clone(),
            Box::new(SipAddressParser::new()),
        )
    }

    fn provider(connection: &ScriptedConnection) -> LdapContactProvider<ScriptedConnection> {
        provider_with(DirectoryConfig::default(), connection)
    }

    fn entry(msgid: MessageId, name: &str, mobile: &str) -> ProtocolMessage {
        let entry = DirectoryEntry::new(format!("uid={name},dc=example,dc=com"))
            .with_attr("givenName", name)
            .with_attr("mobile", mobile);
        ProtocolMessage::new(msgid, MessageBody::SearchEntry(entry))
    }

    fn done(msgid: MessageId) -> ProtocolMessage {
        ProtocolMessage::new(msgid, MessageBody::SearchResult(ResultStatus::success()))
    }

    fn bind_result(msgid: MessageId, code: u32) -> ProtocolMessage {
        let status = ResultStatus {
            code,
            text: String::new(),
        };
        ProtocolMessage::new(msgid, MessageBody::Bind(status))
    }

    // ------------------------------------------------------------------
    // Bind
    // ------------------------------------------------------------------

    #[test]
    fn anonymous_bind_is_issued_on_creation() {
        let conn = ScriptedConnection::default();
        let provider = provider(&conn);

        assert_eq!(conn.script().binds, [(String::new(), String::new())]);
        assert_eq!(provider.bind_state(), BindState::BindPending);
        assert_eq!(provider.pending_bind(), Some(1));
        assert!(!provider.is_bound());
    }

    #[test]
    fn plain_bind_uses_credentials_and_sasl_skips_bind() {
        let conn = ScriptedConnection::default();
        let config = DirectoryConfig::builder()
            .plain_auth("cn=reader,dc=example,dc=com", "s3cret")
            .build()
            .unwrap();
        let _provider = provider_with(config, &conn);
        assert_eq!(
            conn.script().binds,
            [("cn=reader,dc=example,dc=com".to_string(), "s3cret".to_string())]
        );

        let conn = ScriptedConnection::default();
        let config = DirectoryConfig::builder()
            .auth_method(AuthMethod::Sasl)
            .build()
            .unwrap();
        let provider = provider_with(config, &conn);
        assert!(conn.script().binds.is_empty());
        assert_eq!(provider.bind_state(), BindState::Disconnected);
        assert_eq!(provider.pending_bind(), None);
    }

    #[test]
    fn bind_result_completes_bind() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.push(vec![bind_result(1, 0)]);
        provider.iterate();

        assert_eq!(provider.bind_state(), BindState::Bound);
        assert_eq!(provider.pending_bind(), None);
    }

    #[test]
    fn mismatched_bind_result_is_ignored() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.push(vec![bind_result(42, 0)]);
        provider.iterate();

        assert_eq!(provider.bind_state(), BindState::BindPending);
        assert_eq!(provider.pending_bind(), Some(1));
    }

    #[test]
    fn rejected_bind_does_not_block_searches() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.push(vec![bind_result(1, 49)]);
        provider.iterate();
        assert_eq!(provider.bind_state(), BindState::BindFailed);
        assert_eq!(provider.pending_bind(), None);

        let (deliveries, callback) = collector();
        let handle = provider.submit("bob", callback).unwrap();
        conn.push(vec![entry(handle.msgid(), "Bob", "sip:bob@example.com"), done(handle.msgid())]);
        provider.iterate();

        assert_eq!(deliveries.lock().unwrap()[0].len(), 1);
    }

    #[test]
    fn bind_refused_at_issue_time() {
        let conn = ScriptedConnection::default();
        conn.script().reject_bind = true;
        let mut provider = provider(&conn);

        assert_eq!(provider.bind_state(), BindState::BindFailed);
        assert_eq!(provider.pending_bind(), None);

        provider.iterate();
        assert_eq!(conn.script().polls, 0);
    }

    #[test]
    fn idle_iterate_does_not_poll() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.push(vec![bind_result(1, 0)]);
        provider.iterate();
        assert_eq!(conn.script().polls, 1);

        provider.iterate();
        provider.iterate();
        assert_eq!(conn.script().polls, 1);
    }

    // ------------------------------------------------------------------
    // Searches
    // ------------------------------------------------------------------

    #[test]
    fn single_entry_search_delivers_contact() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let handle = provider.submit("bob", callback).unwrap();
        assert_eq!(conn.script().filters, ["uid=*bob*"]);
        assert_eq!(provider.pending_count(), 1);

        let id = handle.msgid();
        conn.push(vec![entry(id, "Bob", "sip:bob@example.com"), done(id)]);
        provider.iterate();

        let deliveries = deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].len(), 1);
        assert_eq!(deliveries[0][0].name.as_deref(), Some("Bob"));
        assert_eq!(deliveries[0][0].address.as_str(), "sip:bob@example.com");
        assert_eq!(provider.pending_count(), 0);
    }

    #[test]
    fn unparsable_address_drops_only_that_entry() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("b", callback).unwrap().msgid();
        conn.push(vec![
            entry(id, "Broken", ""),
            entry(id, "Bob", "sip:bob@example.com"),
            done(id),
        ]);
        provider.iterate();

        let deliveries = deliveries.lock().unwrap();
        assert_eq!(deliveries[0].len(), 1);
        assert_eq!(deliveries[0][0].name.as_deref(), Some("Bob"));
    }

    #[test]
    fn entries_accumulate_across_polls() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("a", callback).unwrap().msgid();
        conn.push(vec![entry(id, "Alice", "sip:alice@example.com")]);
        conn.push(vec![entry(id, "Anna", "not an address")]);
        conn.push(vec![entry(id, "Amir", "sip:amir@example.com")]);
        conn.push(vec![done(id)]);

        for _ in 0..3 {
            provider.iterate();
        }
        assert!(deliveries.lock().unwrap().is_empty());
        assert_eq!(provider.requests().get(id).unwrap().found_count(), 2);

        provider.iterate();
        let deliveries = deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        let names: Vec<_> = deliveries[0].iter().map(Contact::display_name).collect();
        assert_eq!(names, ["Alice", "Amir"]);
        assert!(provider.requests().get(id).is_none());
    }

    #[test]
    fn concurrent_searches_get_distinct_ids() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let ids: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|p| provider.submit(p, Box::new(|_: Vec<Contact>| {})).unwrap().msgid())
            .collect();

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(provider.pending_count(), 4);
    }

    #[test]
    fn long_predicate_is_truncated_and_submitted() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let predicate = "x".repeat(4096);
        provider.submit(&predicate, Box::new(|_: Vec<Contact>| {})).unwrap();

        let script = conn.script();
        assert_eq!(script.filters.len(), 1);
        assert_eq!(script.filters[0].len(), FILTER_MAX_LEN);
    }

    #[test]
    fn rejected_search_registers_nothing() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);
        conn.script().reject_search = true;

        let (deliveries, callback) = collector();
        let err = provider.submit("bob", callback).unwrap_err();
        assert!(matches!(err, LdapError::Connection(_)));
        assert_eq!(provider.pending_count(), 0);
        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_filter_is_rejected_synchronously() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let err = provider
            .submit("bob)(", Box::new(|_: Vec<Contact>| {}))
            .unwrap_err();
        assert!(matches!(err, LdapError::InvalidFilter { .. }));
        assert_eq!(provider.pending_count(), 0);
    }

    #[test]
    fn predicate_breaking_filter_structure_is_rejected() {
        let conn = ScriptedConnection::default();
        let config = DirectoryConfig::builder()
            .filter("(uid=*%s*)")
            .build()
            .unwrap();
        let mut provider = provider_with(config, &conn);

        let (deliveries, callback) = collector();
        let err = provider.submit("a*)(cn=b", callback).unwrap_err();
        assert!(matches!(err, LdapError::InvalidFilter { .. }));
        assert_eq!(provider.pending_count(), 0);
        assert!(conn.script().filters.is_empty());
        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn searches_above_ceiling_are_still_accepted() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        for i in 0..=MAX_RUNNING_REQUESTS {
            provider
                .submit(&format!("user{i}"), Box::new(|_: Vec<Contact>| {}))
                .unwrap();
        }
        assert_eq!(provider.pending_count(), MAX_RUNNING_REQUESTS + 1);
    }

    #[test]
    fn duplicate_id_from_connection_is_rejected() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.force_id(5);
        conn.force_id(5);
        provider.submit("a", Box::new(|_: Vec<Contact>| {})).unwrap();
        let err = provider
            .submit("b", Box::new(|_: Vec<Contact>| {}))
            .unwrap_err();

        assert!(matches!(err, LdapError::DuplicateMessageId(5)));
        assert_eq!(provider.pending_count(), 1);
        assert_eq!(provider.requests().get(5).unwrap().predicate(), "a");
        assert!(conn.script().abandoned.is_empty());
    }

    #[test]
    fn non_success_result_still_delivers() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("bob", callback).unwrap().msgid();
        let size_limit_exceeded = ResultStatus {
            code: 4,
            text: "size limit exceeded".into(),
        };
        conn.push(vec![
            entry(id, "Bob", "sip:bob@example.com"),
            ProtocolMessage::new(id, MessageBody::SearchResult(size_limit_exceeded)),
        ]);
        provider.iterate();

        assert_eq!(deliveries.lock().unwrap()[0].len(), 1);
        assert_eq!(provider.pending_count(), 0);
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    #[test]
    fn batches_route_to_their_own_request() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (first, first_cb) = collector();
        let (second, second_cb) = collector();
        let m1 = provider.submit("alice", first_cb).unwrap().msgid();
        let m2 = provider.submit("bob", second_cb).unwrap().msgid();

        conn.push(vec![entry(m2, "Bob", "sip:bob@example.com"), done(m2)]);
        provider.iterate();

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap()[0][0].display_name(), "Bob");
        assert!(provider.requests().get(m1).is_some());
        assert_eq!(provider.requests().get(m1).unwrap().found_count(), 0);
    }

    #[test]
    fn mixed_batch_follows_first_message_id() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (first, first_cb) = collector();
        let (_second, second_cb) = collector();
        let m1 = provider.submit("alice", first_cb).unwrap().msgid();
        let m2 = provider.submit("bob", second_cb).unwrap().msgid();

        conn.push(vec![
            entry(m1, "Alice", "sip:alice@example.com"),
            entry(m2, "Bob", "sip:bob@example.com"),
        ]);
        provider.iterate();

        assert_eq!(provider.requests().get(m1).unwrap().found_count(), 2);
        assert_eq!(provider.requests().get(m2).unwrap().found_count(), 0);
        assert!(first.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("bob", callback).unwrap().msgid();

        conn.push(vec![entry(999, "Eve", "sip:eve@example.com"), done(999)]);
        provider.iterate();

        assert!(deliveries.lock().unwrap().is_empty());
        assert_eq!(provider.requests().get(id).unwrap().found_count(), 0);
    }

    #[test]
    fn unknown_kinds_and_references_are_ignored() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("bob", callback).unwrap().msgid();

        conn.push(vec![ProtocolMessage::new(id, MessageBody::Other(24))]);
        conn.push(vec![
            ProtocolMessage::new(id, MessageBody::SearchReference(vec![
                "ldap://other.example.com/dc=example,dc=com".into(),
            ])),
            ProtocolMessage::new(id, MessageBody::Intermediate),
            entry(id, "Bob", "sip:bob@example.com"),
        ]);
        conn.push(vec![done(id)]);
        for _ in 0..3 {
            provider.iterate();
        }

        assert_eq!(deliveries.lock().unwrap()[0].len(), 1);
    }

    #[test]
    fn transient_poll_error_is_retried() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("bob", callback).unwrap().msgid();
        conn.push_error();
        conn.push(vec![entry(id, "Bob", "sip:bob@example.com"), done(id)]);

        provider.iterate();
        assert!(deliveries.lock().unwrap().is_empty());
        assert_eq!(provider.pending_count(), 1);

        provider.iterate();
        assert_eq!(deliveries.lock().unwrap().len(), 1);
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    #[test]
    fn cancel_removes_only_that_request() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (cancelled, cancelled_cb) = collector();
        let (kept, kept_cb) = collector();
        let handle = provider.submit("alice", cancelled_cb).unwrap();
        let m1 = handle.msgid();
        let m2 = provider.submit("bob", kept_cb).unwrap().msgid();

        provider.cancel(handle).unwrap();
        assert_eq!(provider.pending_count(), 1);
        assert_eq!(conn.script().abandoned, [m1]);

        conn.push(vec![entry(m1, "Alice", "sip:alice@example.com"), done(m1)]);
        conn.push(vec![entry(m2, "Bob", "sip:bob@example.com"), done(m2)]);
        provider.iterate();
        provider.iterate();

        assert!(cancelled.lock().unwrap().is_empty());
        assert_eq!(kept.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancel_with_stale_handle_is_not_found() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        conn.force_id(7);
        conn.force_id(7);
        let stale = provider.submit("alice", Box::new(|_: Vec<Contact>| {})).unwrap();
        conn.push(vec![done(7)]);
        provider.iterate();
        assert_eq!(provider.pending_count(), 0);

        let (deliveries, callback) = collector();
        let current = provider.submit("bob", callback).unwrap();
        assert_eq!(current.msgid(), 7);

        let err = provider.cancel(stale).unwrap_err();
        assert!(matches!(err, LdapError::RequestNotFound(7)));
        assert_eq!(provider.pending_count(), 1);

        conn.push(vec![done(7)]);
        provider.iterate();
        assert_eq!(deliveries.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancel_through_provider_trait_reports_not_found() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);
        let provider: &mut dyn ContactProvider = &mut provider;

        let handle = provider
            .begin_search("bob", Box::new(|_: Vec<Contact>| {}))
            .unwrap();
        let stale = SearchHandle::new(handle.msgid(), Uuid::now_v7());

        let err = provider.cancel_search(stale).unwrap_err();
        assert!(matches!(err, ProviderError::SearchNotFound(_)));
        provider.cancel_search(handle).unwrap();
        assert_eq!(provider.pending_count(), 0);
        assert_eq!(provider.provider_type(), "ldap");
    }

    // ------------------------------------------------------------------
    // Reload, dump, teardown
    // ------------------------------------------------------------------

    #[test]
    fn reload_swaps_config_and_keeps_pending_filters() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let (deliveries, callback) = collector();
        let id = provider.submit("bob", callback).unwrap().msgid();

        let store = MemoryConfigStore::new()
            .with(CONFIG_SECTION, "filter", "(cn=%s)")
            .with(CONFIG_SECTION, "name_attribute", "cn")
            .with(CONFIG_SECTION, "attributes", "cn,mobile");
        provider.reload_config(&store).unwrap();

        assert_eq!(provider.config().filter, "(cn=%s)");
        assert_eq!(provider.requests().get(id).unwrap().filter(), "uid=*bob*");

        let entry = DirectoryEntry::new("uid=bob,dc=example,dc=com")
            .with_attr("cn", "Bob Builder")
            .with_attr("mobile", "sip:bob@example.com");
        conn.push(vec![ProtocolMessage::new(id, MessageBody::SearchEntry(entry)), done(id)]);
        provider.iterate();
        assert_eq!(deliveries.lock().unwrap()[0][0].display_name(), "Bob Builder");

        provider.submit("alice", Box::new(|_: Vec<Contact>| {})).unwrap();
        assert_eq!(conn.script().filters.last().unwrap(), "(cn=alice)");
    }

    #[test]
    fn invalid_reload_keeps_previous_config() {
        let conn = ScriptedConnection::default();
        let mut provider = provider(&conn);

        let store = MemoryConfigStore::new().with(CONFIG_SECTION, "filter", "uid=bob");
        assert!(provider.reload_config(&store).is_err());
        assert_eq!(provider.config().filter, "uid=*%s*");
    }

    #[test]
    fn describe_redacts_password() {
        let conn = ScriptedConnection::default();
        let config = DirectoryConfig::builder()
            .plain_auth("cn=reader,dc=example,dc=com", "s3cret")
            .build()
            .unwrap();
        let mut provider = provider_with(config, &conn);
        provider.submit("bob", Box::new(|_: Vec<Contact>| {})).unwrap();

        let dump = provider.describe();
        assert!(!dump.contains("s3cret"));
        assert!(dump.contains("<redacted>"));
        assert!(dump.contains("scripted"));
        assert!(dump.contains("bind-pending"));
        assert!(dump.contains("pending bind id: 1"));
        assert!(dump.contains("filter=uid=*bob*"));
        assert!(dump.contains("homePhone"));
    }

    #[test]
    fn drop_releases_pending_searches_without_callbacks() {
        let conn = ScriptedConnection::default();
        let (deliveries, callback) = collector();
        {
            let mut provider = provider(&conn);
            provider.submit("alice", callback).unwrap();
            provider.submit("bob", Box::new(|_: Vec<Contact>| {})).unwrap();
        }

        let script = conn.script();
        assert_eq!(script.unbinds, 1);
        assert_eq!(script.abandoned, [2, 3]);
        assert!(deliveries.lock().unwrap().is_empty());
    }
}
