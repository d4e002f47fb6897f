//! Grid providers: config validation plus the rebuild operations.
//!
//! Two providers ship with the crate. [`HashedProvider`] accepts any finite
//! bounds; [`UniformProvider`] additionally requires the cells to tile the
//! world exactly. Further providers can be registered at runtime in a
//! [`ProviderRegistry`] and receive ids from [`ProviderId::FIRST_CUSTOM`] up.

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::info;

use crate::lookup::EntryLookup;
use crate::partial::{PartialOutcome, PartialUpdater};
use crate::rebuild::{FullRebuildOutcome, RebuildStaging};
use crate::storage::GridBuffers;
use crate::{ConfigError, DirtyOp, GridConfig, IndexedEntity, PartialRebuildError, ProviderId};

/// Relative slack allowed when checking that uniform cells tile the world.
const TILING_TOLERANCE: f32 = 1e-4;

/// Validation and rebuild behaviour for one flavour of grid.
///
/// Only `name` and `validate` are required; the rebuild operations default
/// to the crate's own engines.
pub trait GridProvider: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, config: &GridConfig) -> Result<(), ConfigError>;

    fn apply_partial(
        &self,
        updater: &mut PartialUpdater,
        config: &GridConfig,
        buffers: &mut GridBuffers,
        ops: &[DirtyOp],
    ) -> Result<PartialOutcome, PartialRebuildError> {
        updater.apply(config, buffers, ops)
    }

    fn rebuild_full(
        &self,
        staging: &mut RebuildStaging,
        config: &GridConfig,
        indexed: &[IndexedEntity],
        buffers: &mut GridBuffers,
    ) -> FullRebuildOutcome {
        staging.rebuild(config, indexed, buffers)
    }

    fn rebuild_lookup(&self, lookup: &mut EntryLookup, buffers: &GridBuffers) {
        lookup.rebuild(buffers.entries());
    }
}

/// Checks shared by every built-in provider.
fn validate_common(config: &GridConfig) -> Result<(), ConfigError> {
    if !(config.cell_size.is_finite() && config.cell_size > 0.0) {
        return Err(ConfigError::NonPositiveCellSize(config.cell_size));
    }
    if !config.world_min.is_finite() || !config.world_max.is_finite() {
        return Err(ConfigError::NonFiniteBounds);
    }
    if config.world_min.cmpgt(config.world_max).any() {
        return Err(ConfigError::InvertedBounds);
    }
    for (axis, count) in ['x', 'y', 'z'].into_iter().zip(config.cell_counts.to_array()) {
        if count == 0 {
            return Err(ConfigError::ZeroCellCount { axis });
        }
    }
    let product = u64::from(config.cell_counts.x)
        * u64::from(config.cell_counts.y)
        * u64::from(config.cell_counts.z);
    if product > i32::MAX as u64 {
        return Err(ConfigError::CellCountOverflow);
    }
    Ok(())
}

/// Lenient grid over arbitrary world bounds.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashedProvider;

impl GridProvider for HashedProvider {
    fn name(&self) -> &str {
        "hashed"
    }

    fn validate(&self, config: &GridConfig) -> Result<(), ConfigError> {
        validate_common(config)
    }
}

/// Strict grid: `cell_size * cell_counts` must equal the world extent.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformProvider;

impl GridProvider for UniformProvider {
    fn name(&self) -> &str {
        "uniform"
    }

    fn validate(&self, config: &GridConfig) -> Result<(), ConfigError> {
        validate_common(config)?;
        let extent = config.extent().to_array();
        let counts = config.cell_counts.to_array();
        for ((axis, expected), count) in ['x', 'y', 'z'].into_iter().zip(extent).zip(counts) {
            let actual = config.cell_size * count as f32;
            if (actual - expected).abs() > TILING_TOLERANCE * expected.abs().max(1.0) {
                return Err(ConfigError::UniformTilingMismatch {
                    axis,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Provider a grid currently runs with.
///
/// The built-ins dispatch statically; only registered providers go through
/// a trait object.
#[derive(Clone)]
pub enum ActiveProvider {
    Hashed(HashedProvider),
    Uniform(UniformProvider),
    Custom(Arc<dyn GridProvider>),
}

impl ActiveProvider {
    /// Resolve `id`, looking custom ids up in `registry`.
    pub fn resolve(id: ProviderId, registry: &ProviderRegistry) -> Result<Self, ConfigError> {
        match id {
            ProviderId::HASHED => Ok(Self::Hashed(HashedProvider)),
            ProviderId::UNIFORM => Ok(Self::Uniform(UniformProvider)),
            _ => registry
                .get(id)
                .map(|entry| Self::Custom(Arc::clone(&entry.provider)))
                .ok_or(ConfigError::UnknownProvider(id)),
        }
    }
}

impl fmt::Debug for ActiveProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActiveProvider({})", self.name())
    }
}

impl GridProvider for ActiveProvider {
    fn name(&self) -> &str {
        match self {
            Self::Hashed(p) => p.name(),
            Self::Uniform(p) => p.name(),
            Self::Custom(p) => p.name(),
        }
    }

    fn validate(&self, config: &GridConfig) -> Result<(), ConfigError> {
        match self {
            Self::Hashed(p) => p.validate(config),
            Self::Uniform(p) => p.validate(config),
            Self::Custom(p) => p.validate(config),
        }
    }

    fn apply_partial(
        &self,
        updater: &mut PartialUpdater,
        config: &GridConfig,
        buffers: &mut GridBuffers,
        ops: &[DirtyOp],
    ) -> Result<PartialOutcome, PartialRebuildError> {
        match self {
            Self::Hashed(p) => p.apply_partial(updater, config, buffers, ops),
            Self::Uniform(p) => p.apply_partial(updater, config, buffers, ops),
            Self::Custom(p) => p.apply_partial(updater, config, buffers, ops),
        }
    }

    fn rebuild_full(
        &self,
        staging: &mut RebuildStaging,
        config: &GridConfig,
        indexed: &[IndexedEntity],
        buffers: &mut GridBuffers,
    ) -> FullRebuildOutcome {
        match self {
            Self::Hashed(p) => p.rebuild_full(staging, config, indexed, buffers),
            Self::Uniform(p) => p.rebuild_full(staging, config, indexed, buffers),
            Self::Custom(p) => p.rebuild_full(staging, config, indexed, buffers),
        }
    }

    fn rebuild_lookup(&self, lookup: &mut EntryLookup, buffers: &GridBuffers) {
        match self {
            Self::Hashed(p) => p.rebuild_lookup(lookup, buffers),
            Self::Uniform(p) => p.rebuild_lookup(lookup, buffers),
            Self::Custom(p) => p.rebuild_lookup(lookup, buffers),
        }
    }
}

/// A provider registered at runtime.
pub struct RegisteredProvider {
    pub id: ProviderId,
    pub name: String,
    pub provider: Arc<dyn GridProvider>,
    /// Opaque provider-specific settings, passed through untouched.
    pub config_blob: Option<serde_json::Value>,
}

impl fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config_blob", &self.config_blob)
            .finish_non_exhaustive()
    }
}

/// Maps provider ids to registered providers.
///
/// Ids are handed out sequentially and never reused, so a stale id can not
/// silently resolve to a different provider. `version` increases on every
/// registration and removal.
#[derive(Debug)]
pub struct ProviderRegistry {
    entries: SmallVec<[RegisteredProvider; 4]>,
    next_id: u16,
    version: u64,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: LazyLock<RwLock<ProviderRegistry>> =
    LazyLock::new(|| RwLock::new(ProviderRegistry::new()));

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: SmallVec::new(),
            next_id: u16::from(ProviderId::FIRST_CUSTOM.0),
            version: 0,
        }
    }

    /// Process-wide registry.
    pub fn global() -> &'static RwLock<Self> {
        &GLOBAL
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn GridProvider>,
        config_blob: Option<serde_json::Value>,
    ) -> Result<ProviderId, ConfigError> {
        let name = name.into();
        if name == HashedProvider.name()
            || name == UniformProvider.name()
            || self.entries.iter().any(|entry| entry.name == name)
        {
            return Err(ConfigError::DuplicateProviderName(name));
        }
        let id = u8::try_from(self.next_id)
            .map(ProviderId)
            .map_err(|_| ConfigError::ProviderIdsExhausted)?;

        self.next_id += 1;
        self.version += 1;
        info!(?id, %name, "registered grid provider");
        self.entries.push(RegisteredProvider {
            id,
            name,
            provider,
            config_blob,
        });
        Ok(id)
    }

    /// Remove a registered provider. Built-in ids are never stored here.
    pub fn unregister(&mut self, id: ProviderId) -> Option<RegisteredProvider> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        let removed = self.entries.remove(position);
        self.version += 1;
        info!(?id, name = %removed.name, "unregistered grid provider");
        Some(removed)
    }

    /// Registered provider under `id`; built-ins are not stored.
    #[must_use]
    pub fn get(&self, id: ProviderId) -> Option<&RegisteredProvider> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Id registered under `name`, built-ins included.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ProviderId> {
        match name {
            "hashed" => Some(ProviderId::HASHED),
            "uniform" => Some(ProviderId::UNIFORM),
            _ => self
                .entries
                .iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.id),
        }
    }

    /// Bumped on every register and unregister.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.entries.iter()
    }
}
