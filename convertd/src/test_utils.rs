//! Test utilities for integration testing (available with `test-utils` feature).
//!
//! Canned configuration, scriptable engine and store doubles, and a
//! ready-to-go test server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;

use crate::config::{Config, DeliveryConfig, EngineConfig};
use crate::delivery::{self, ObjectStore};
use crate::engine::{self, ConversionEngine, ConversionSession, EngineError};
use crate::{AppState, build_router};

/// Configuration for tests: stub engine, direct delivery, sane defaults.
pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        engine: EngineConfig::Stub,
        delivery: DeliveryConfig::Direct,
        ..Config::default()
    }
}

/// Test server over a router built from `config` and the given doubles.
pub fn create_test_app(config: Config, engine: Arc<dyn ConversionEngine>, store: Option<Arc<dyn ObjectStore>>) -> TestServer {
    let state = AppState::builder().config(config).engine(engine).maybe_store(store).build();
    let router = build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to start test server")
}

/// Successful open/close counts observed by a [`MockEngine`].
#[derive(Debug, Default)]
pub struct MockCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Engine double with scriptable failures and open/close accounting.
#[derive(Debug, Default, Clone)]
pub struct MockEngine {
    counters: Arc<MockCounters>,
    fail_open: bool,
    fail_export: bool,
    fail_close: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn failing_export() -> Self {
        Self {
            fail_export: true,
            ..Self::default()
        }
    }

    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl ConversionEngine for MockEngine {
    async fn open(&self, _document: Bytes) -> engine::Result<Box<dyn ConversionSession>> {
        if self.fail_open {
            return Err(EngineError::Failed {
                message: "mock open failure".to_string(),
            });
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            counters: Arc::clone(&self.counters),
            fail_export: self.fail_export,
            fail_close: self.fail_close,
        }))
    }
}

pub struct MockSession {
    counters: Arc<MockCounters>,
    fail_export: bool,
    fail_close: bool,
}

#[async_trait]
impl ConversionSession for MockSession {
    async fn export_pdf(&mut self) -> engine::Result<Bytes> {
        if self.fail_export {
            return Err(EngineError::ExportFailed {
                message: "mock export failure".to_string(),
            });
        }
        Ok(Bytes::from_static(b"%PDF-1.4 mock\n%%EOF"))
    }

    async fn close(&mut self) -> engine::Result<()> {
        // The attempt counts even when it fails; callers assert close was
        // tried, not that it worked.
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(EngineError::Failed {
                message: "mock close failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory store that records every put and answers with a `mock://` URL.
#[derive(Debug, Default)]
pub struct MockStore {
    puts: Mutex<Vec<StoredPut>>,
}

#[derive(Debug, Clone)]
pub struct StoredPut {
    pub key: String,
    pub size_bytes: usize,
    pub content_type: String,
}

impl MockStore {
    pub fn puts(&self) -> Vec<StoredPut> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> delivery::Result<String> {
        self.puts.lock().unwrap().push(StoredPut {
            key: key.to_string(),
            size_bytes: bytes.len(),
            content_type: content_type.to_string(),
        });
        Ok(format!("mock://store/{key}"))
    }
}
