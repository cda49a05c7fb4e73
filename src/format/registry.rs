//! Registry of format providers by role.
//!
//! Each role keeps its providers in registration order, keyed by format id.
//! A provider whose id is already taken in a role (or is the reserved null
//! id) is dropped with a warning; the first registration wins.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::id::FormatId;
use super::plaintext::PlaintextFormat;
use super::provider::{
    FormatProvider, MulticastAnnouncementDecoder, MulticastAnnouncementEncoder,
    MulticastRequestDecoder, MulticastRequestEncoder, UnicastDiscoveryClient,
    UnicastDiscoveryServer,
};
use crate::config::DiscoveryConfig;
use crate::core::{ConfigError, PLAINTEXT_FORMAT_NAME};

/// Part a provider plays in discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatRole {
    /// Encodes outgoing multicast requests.
    MulticastRequestEncoder,
    /// Decodes incoming multicast requests.
    MulticastRequestDecoder,
    /// Encodes outgoing multicast announcements.
    MulticastAnnouncementEncoder,
    /// Decodes incoming multicast announcements.
    MulticastAnnouncementDecoder,
    /// Client side of unicast discovery.
    UnicastClient,
    /// Server side of unicast discovery.
    UnicastServer,
}

struct RoleTable<P: ?Sized> {
    role: FormatRole,
    entries: IndexMap<FormatId, Arc<P>>,
}

impl<P: ?Sized + FormatProvider> RoleTable<P> {
    fn new(role: FormatRole) -> Self {
        Self {
            role,
            entries: IndexMap::new(),
        }
    }

    fn register(&mut self, provider: Arc<P>) -> bool {
        let id = FormatId::for_name(provider.format_name());
        self.insert(id, provider)
    }

    fn insert(&mut self, id: FormatId, provider: Arc<P>) -> bool {
        if id.is_null() {
            warn!(
                role = ?self.role,
                format = provider.format_name(),
                "format name hashes to the reserved null id; provider dropped"
            );
            return false;
        }
        if let Some(existing) = self.entries.get(&id) {
            warn!(
                role = ?self.role,
                %id,
                kept = existing.format_name(),
                dropped = provider.format_name(),
                "format id collision; later provider dropped"
            );
            return false;
        }
        debug!(role = ?self.role, %id, format = provider.format_name(), "registered format");
        self.entries.insert(id, provider);
        true
    }

    fn get(&self, id: FormatId) -> Option<&Arc<P>> {
        self.entries.get(&id)
    }

    fn iter(&self) -> impl Iterator<Item = (FormatId, &Arc<P>)> {
        self.entries.iter().map(|(id, p)| (*id, p))
    }

    fn ids(&self) -> Vec<FormatId> {
        self.entries.keys().copied().collect()
    }

    fn names(&self) -> Vec<&str> {
        self.entries.values().map(|p| p.format_name()).collect()
    }
}

/// Providers for every role, built once and then shared read-only.
pub struct FormatRegistry {
    request_encoders: RoleTable<dyn MulticastRequestEncoder>,
    request_decoders: RoleTable<dyn MulticastRequestDecoder>,
    announcement_encoders: RoleTable<dyn MulticastAnnouncementEncoder>,
    announcement_decoders: RoleTable<dyn MulticastAnnouncementDecoder>,
    unicast_clients: RoleTable<dyn UnicastDiscoveryClient>,
    unicast_servers: RoleTable<dyn UnicastDiscoveryServer>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            request_encoders: RoleTable::new(FormatRole::MulticastRequestEncoder),
            request_decoders: RoleTable::new(FormatRole::MulticastRequestDecoder),
            announcement_encoders: RoleTable::new(FormatRole::MulticastAnnouncementEncoder),
            announcement_decoders: RoleTable::new(FormatRole::MulticastAnnouncementDecoder),
            unicast_clients: RoleTable::new(FormatRole::UnicastClient),
            unicast_servers: RoleTable::new(FormatRole::UnicastServer),
        }
    }

    /// A registry holding the built-in plaintext format in every role.
    pub fn with_plaintext() -> Self {
        let mut registry = Self::new();
        registry.register_all_roles(Arc::new(PlaintextFormat::new()));
        registry
    }

    /// Build a registry from the formats named in `config`, in order.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for name in &config.formats {
            match name.as_str() {
                PLAINTEXT_FORMAT_NAME => {
                    registry.register_all_roles(Arc::new(PlaintextFormat::new()));
                }
                other => return Err(ConfigError::UnknownFormat(other.to_string())),
            }
        }
        Ok(registry)
    }

    /// Register a multicast request encoder. Returns `false` if dropped.
    pub fn register_multicast_request_encoder(
        &mut self,
        provider: Arc<dyn MulticastRequestEncoder>,
    ) -> bool {
        self.request_encoders.register(provider)
    }

    /// Register a multicast request decoder. Returns `false` if dropped.
    pub fn register_multicast_request_decoder(
        &mut self,
        provider: Arc<dyn MulticastRequestDecoder>,
    ) -> bool {
        self.request_decoders.register(provider)
    }

    /// Register a multicast announcement encoder. Returns `false` if dropped.
    pub fn register_multicast_announcement_encoder(
        &mut self,
        provider: Arc<dyn MulticastAnnouncementEncoder>,
    ) -> bool {
        self.announcement_encoders.register(provider)
    }

    /// Register a multicast announcement decoder. Returns `false` if dropped.
    pub fn register_multicast_announcement_decoder(
        &mut self,
        provider: Arc<dyn MulticastAnnouncementDecoder>,
    ) -> bool {
        self.announcement_decoders.register(provider)
    }

    /// Register a unicast discovery client. Returns `false` if dropped.
    pub fn register_unicast_client(&mut self, provider: Arc<dyn UnicastDiscoveryClient>) -> bool {
        self.unicast_clients.register(provider)
    }

    /// Register a unicast discovery server. Returns `false` if dropped.
    pub fn register_unicast_server(&mut self, provider: Arc<dyn UnicastDiscoveryServer>) -> bool {
        self.unicast_servers.register(provider)
    }

    /// Register a provider that implements every role.
    pub fn register_all_roles<F>(&mut self, provider: Arc<F>)
    where
        F: MulticastRequestEncoder
            + MulticastRequestDecoder
            + MulticastAnnouncementEncoder
            + MulticastAnnouncementDecoder
            + UnicastDiscoveryClient
            + UnicastDiscoveryServer
            + 'static,
    {
        self.register_multicast_request_encoder(provider.clone());
        self.register_multicast_request_decoder(provider.clone());
        self.register_multicast_announcement_encoder(provider.clone());
        self.register_multicast_announcement_decoder(provider.clone());
        self.register_unicast_client(provider.clone());
        self.register_unicast_server(provider);
    }

    /// Multicast request encoders in registration order.
    pub fn multicast_request_encoders(
        &self,
    ) -> impl Iterator<Item = (FormatId, &Arc<dyn MulticastRequestEncoder>)> {
        self.request_encoders.iter()
    }

    /// Multicast announcement encoders in registration order.
    pub fn multicast_announcement_encoders(
        &self,
    ) -> impl Iterator<Item = (FormatId, &Arc<dyn MulticastAnnouncementEncoder>)> {
        self.announcement_encoders.iter()
    }

    /// Unicast clients in registration order.
    pub fn unicast_clients(&self) -> impl Iterator<Item = (FormatId, &Arc<dyn UnicastDiscoveryClient>)> {
        self.unicast_clients.iter()
    }

    /// Unicast servers in registration order.
    pub fn unicast_servers(&self) -> impl Iterator<Item = (FormatId, &Arc<dyn UnicastDiscoveryServer>)> {
        self.unicast_servers.iter()
    }

    /// Decoder for a multicast request format.
    pub fn multicast_request_decoder(&self, id: FormatId) -> Option<&Arc<dyn MulticastRequestDecoder>> {
        self.request_decoders.get(id)
    }

    /// Decoder for a multicast announcement format.
    pub fn multicast_announcement_decoder(
        &self,
        id: FormatId,
    ) -> Option<&Arc<dyn MulticastAnnouncementDecoder>> {
        self.announcement_decoders.get(id)
    }

    /// Unicast client for a format.
    pub fn unicast_client(&self, id: FormatId) -> Option<&Arc<dyn UnicastDiscoveryClient>> {
        self.unicast_clients.get(id)
    }

    /// Unicast server for a format.
    pub fn unicast_server(&self, id: FormatId) -> Option<&Arc<dyn UnicastDiscoveryServer>> {
        self.unicast_servers.get(id)
    }

    /// Whether `id` is registered for `role`.
    pub fn contains(&self, role: FormatRole, id: FormatId) -> bool {
        match role {
            FormatRole::MulticastRequestEncoder => self.request_encoders.get(id).is_some(),
            FormatRole::MulticastRequestDecoder => self.request_decoders.get(id).is_some(),
            FormatRole::MulticastAnnouncementEncoder => self.announcement_encoders.get(id).is_some(),
            FormatRole::MulticastAnnouncementDecoder => self.announcement_decoders.get(id).is_some(),
            FormatRole::UnicastClient => self.unicast_clients.get(id).is_some(),
            FormatRole::UnicastServer => self.unicast_servers.get(id).is_some(),
        }
    }

    /// Format ids registered for `role`, in registration order.
    pub fn format_ids(&self, role: FormatRole) -> Vec<FormatId> {
        match role {
            FormatRole::MulticastRequestEncoder => self.request_encoders.ids(),
            FormatRole::MulticastRequestDecoder => self.request_decoders.ids(),
            FormatRole::MulticastAnnouncementEncoder => self.announcement_encoders.ids(),
            FormatRole::MulticastAnnouncementDecoder => self.announcement_decoders.ids(),
            FormatRole::UnicastClient => self.unicast_clients.ids(),
            FormatRole::UnicastServer => self.unicast_servers.ids(),
        }
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("request_encoders", &self.request_encoders.names())
            .field("request_decoders", &self.request_decoders.names())
            .field("announcement_encoders", &self.announcement_encoders.names())
            .field("announcement_decoders", &self.announcement_decoders.names())
            .field("unicast_clients", &self.unicast_clients.names())
            .field("unicast_servers", &self.unicast_servers.names())
            .finish()
    }
}
