//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP request handlers
//! and WebSocket actors simultaneously.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Every worker thread, request and socket needs the same voice link
//! - **Thread safety**: Safe to share between threads
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time (but not both)
//! - **Why needed**: Many requests read the config, updates are rare
//!
//! ### Trait Objects (`Arc<dyn Trait>`)
//! - **Purpose**: Store "something that generates images" without naming the vendor type
//! - **Why needed**: Tests swap in fakes without touching the handlers

use crate::config::AppConfig;
use crate::imaging::ImageGenerator;
use crate::voice::VoiceLink;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
///
/// ## Thread Safety Pattern:
/// - Mutable data sits behind `Arc<RwLock<T>>`
/// - The voice link and image generator do their own locking
/// - Cloning an AppState only clones the `Arc`s
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Deep scan counters
    pub metrics: Arc<RwLock<ScanMetrics>>,

    /// When the server started
    pub start_time: Instant,

    /// The single voice link shared by every browser connection
    pub voice_link: Arc<VoiceLink>,

    /// Image generator used by deep scans
    pub image_generator: Arc<dyn ImageGenerator>,
}

/// Counters for the deep scan endpoint.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ScanMetrics {
    /// Scans requested since server start
    pub requested: u64,

    /// Scans that failed at the vendor
    pub failed: u64,
}

impl AppState {
    /// Create a new AppState.
    ///
    /// ## What this does:
    /// 1. Wraps the config in Arc<RwLock<>> for thread-safe sharing
    /// 2. Creates empty scan metrics
    /// 3. Records the current time as the server start time
    pub fn new(
        config: AppConfig,
        voice_link: Arc<VoiceLink>,
        image_generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(ScanMetrics::default())),
            start_time: Instant::now(),
            voice_link,
            image_generator,
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Update the configuration with validation.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(()) => {
                *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn record_scan(&self, succeeded: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.requested += 1;
        if !succeeded {
            metrics.failed += 1;
        }
    }

    pub fn get_metrics_snapshot(&self) -> ScanMetrics {
        *self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::imaging::ImagingError;
    use crate::voice::testing::{test_setup, FakeConnector};
    use crate::voice::LinkOptions;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Image generator returning a canned result and recording prompts.
    pub struct FakeImages {
        pub result: Result<Vec<u8>, ImagingError>,
        pub prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageGenerator for FakeImages {
        async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ImagingError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.result.clone()
        }
    }

    pub fn state_with_images(result: Result<Vec<u8>, ImagingError>) -> (AppState, Arc<FakeImages>) {
        let images = Arc::new(FakeImages {
            result,
            prompts: Mutex::new(Vec::new()),
        });
        let link = VoiceLink::new(FakeConnector::new(), test_setup(), LinkOptions::default());
        let state = AppState::new(AppConfig::default(), Arc::new(link), images.clone());
        (state, images)
    }

    /// State whose voice link talks to `connector`.
    pub fn state_with_connector(connector: Arc<FakeConnector>) -> AppState {
        let link = VoiceLink::new(connector, test_setup(), LinkOptions::default());
        AppState::new(AppConfig::default(), Arc::new(link), Arc::new(FakeImages {
            result: Ok(vec![1, 2, 3]),
            prompts: Mutex::new(Vec::new()),
        }))
    }

    pub fn test_state() -> AppState {
        state_with_images(Ok(vec![1, 2, 3])).0
    }
}
