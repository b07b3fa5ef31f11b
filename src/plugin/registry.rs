//! Load-time backend selection.

use super::archive::ArchiveBackend;
use super::engine::{ChipEngine, MultiFormatEngine};
use super::gme::GameMusicBackend;
use super::{BackendKind, CodecPlugin};
use crate::{PlayerError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh chip engine for every new session.
pub type ChipEngineFactory = Box<dyn Fn() -> Box<dyn ChipEngine> + Send + Sync>;

/// Engine implementations supplied by the host, keyed by backend family.
#[derive(Default)]
pub struct BackendRegistry {
    multi_format: Option<Arc<dyn MultiFormatEngine>>,
    chip_engines: HashMap<BackendKind, ChipEngineFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the engine behind [`BackendKind::GameMusic`].
    pub fn register_multi_format(&mut self, engine: Arc<dyn MultiFormatEngine>) {
        self.multi_format = Some(engine);
    }

    /// Install a chip engine factory for an archive-fed backend.
    ///
    /// Registering again for the same kind replaces the previous factory.
    pub fn register_chip_engine<F>(&mut self, kind: BackendKind, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn ChipEngine> + Send + Sync + 'static,
    {
        if kind == BackendKind::GameMusic {
            return Err(PlayerError::ConfigError(
                "the gme backend takes a multi-format engine".into(),
            ));
        }
        self.chip_engines.insert(kind, Box::new(factory));
        Ok(())
    }

    /// Whether an engine has been registered for `kind`.
    pub fn is_available(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::GameMusic => self.multi_format.is_some(),
            _ => self.chip_engines.contains_key(&kind),
        }
    }

    /// Registered backends in engine-number order.
    pub fn available(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|&kind| self.is_available(kind))
            .collect()
    }

    /// Build an uninitialized plugin for `kind`.
    pub fn create(&self, kind: BackendKind) -> Result<Box<dyn CodecPlugin>> {
        match kind {
            BackendKind::GameMusic => {
                let engine = self
                    .multi_format
                    .as_ref()
                    .ok_or(PlayerError::BackendUnavailable(kind))?;
                Ok(Box::new(GameMusicBackend::new(Arc::clone(engine))))
            }
            _ => {
                let factory = self
                    .chip_engines
                    .get(&kind)
                    .ok_or(PlayerError::BackendUnavailable(kind))?;
                Ok(Box::new(ArchiveBackend::new(kind, factory())))
            }
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PcmEngine;

    #[test]
    fn test_empty_registry() {
        let registry = BackendRegistry::new();
        assert!(registry.available().is_empty());
        assert!(matches!(
            registry.create(BackendKind::Dsf),
            Err(PlayerError::BackendUnavailable(BackendKind::Dsf))
        ));
        assert!(matches!(
            registry.create(BackendKind::GameMusic),
            Err(PlayerError::BackendUnavailable(BackendKind::GameMusic))
        ));
    }

    #[test]
    fn test_chip_engine_registration() {
        let mut registry = BackendRegistry::new();
        registry
            .register_chip_engine(BackendKind::Psf2, || Box::new(PcmEngine::new()))
            .unwrap();
        registry
            .register_chip_engine(BackendKind::TwoSf, || Box::new(PcmEngine::new()))
            .unwrap();
        assert_eq!(registry.available(), vec![BackendKind::Psf2, BackendKind::TwoSf]);

        let plugin = registry.create(BackendKind::TwoSf).unwrap();
        assert_eq!(plugin.kind(), BackendKind::TwoSf);
        assert_eq!(plugin.voice_name(0).as_deref(), Some("Nintendo DS Audio"));
    }

    #[test]
    fn test_gme_needs_multi_format_engine() {
        let mut registry = BackendRegistry::new();
        assert!(matches!(
            registry.register_chip_engine(BackendKind::GameMusic, || Box::new(PcmEngine::new())),
            Err(PlayerError::ConfigError(_))
        ));
        assert!(!registry.is_available(BackendKind::GameMusic));
    }
}
