//! WebAssembly conversion engine.
//!
//! Drives the vendored engine module through a small C-style ABI:
//!
//! - `engine_alloc(size: i32) -> i32` allocates `size` bytes in guest
//!   memory and returns the offset
//! - `session_open(doc_ptr, doc_len, opts_ptr, opts_len) -> i64` opens a
//!   session for the document; positive handle on success, negative code
//!   on failure (-1 bad arguments, -2 unreadable document, -3 unsupported
//!   format)
//! - `session_export_pdf(handle: i64) -> i64` renders to PDF; the high 32
//!   bits are the buffer offset, the low 32 its length, negative on failure
//! - `session_close(handle: i64) -> i32` releases the session, 0 on success
//!
//! Options are passed to `session_open` as a JSON object (`licenseKey`,
//! `appName`).
//!
//! The module is compiled once on first use and cached; every request gets
//! its own [`Store`] and instance, so sessions cannot observe each other.
//! Runaway conversions are cut short with epoch interruption: a dedicated
//! thread bumps the engine epoch on a fixed tick and every guest call arms
//! a fresh deadline derived from the configured export budget.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wasmtime::{Instance, Memory, Module, Store, Trap, TypedFunc};

use super::{ConversionEngine, ConversionSession, EngineError, Result};
use crate::config::LicenseConfig;

/// How often the epoch advances. One deadline tick is one of these.
const EPOCH_TICK: Duration = Duration::from_millis(100);

pub struct WasmEngine {
    runtime: wasmtime::Engine,
    module_path: PathBuf,
    license: Option<LicenseConfig>,
    export_timeout: Duration,
    module: OnceCell<Module>,
    ticker: CancellationToken,
}

impl WasmEngine {
    pub fn new(module_path: PathBuf, license: Option<LicenseConfig>, export_timeout: Duration) -> anyhow::Result<Self> {
        let mut config = wasmtime::Config::new();
        config.async_support(true);
        config.epoch_interruption(true);
        let runtime = wasmtime::Engine::new(&config)?;

        let ticker = CancellationToken::new();
        let thread_token = ticker.clone();
        let thread_engine = runtime.clone();
        // A plain OS thread: guest code blocks a runtime worker while it
        // runs, so the ticker must not depend on the tokio runtime making
        // progress.
        std::thread::Builder::new()
            .name("convertd-epoch-ticker".to_string())
            .spawn(move || {
                while !thread_token.is_cancelled() {
                    std::thread::sleep(EPOCH_TICK);
                    thread_engine.increment_epoch();
                }
            })?;

        Ok(Self {
            runtime,
            module_path,
            license,
            export_timeout,
            module: OnceCell::new(),
            ticker,
        })
    }

    fn deadline_ticks(&self) -> u64 {
        let budget_ms = self.export_timeout.as_millis() as u64;
        budget_ms.div_ceil(EPOCH_TICK.as_millis() as u64).max(1)
    }

    fn load_failed(&self, message: impl Into<String>) -> EngineError {
        EngineError::LoadFailed {
            path: self.module_path.display().to_string(),
            message: message.into(),
        }
    }

    async fn module(&self) -> Result<&Module> {
        self.module.get_or_try_init(|| self.load_module()).await
    }

    async fn load_module(&self) -> Result<Module> {
        match tokio::fs::metadata(&self.module_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::AssetMissing {
                    path: self.module_path.display().to_string(),
                });
            }
            Err(e) => return Err(self.load_failed(e.to_string())),
        }

        let started = Instant::now();
        let runtime = self.runtime.clone();
        let path = self.module_path.clone();
        // Compilation is CPU-bound and takes a while for a large module.
        let compiled = tokio::task::spawn_blocking(move || Module::from_file(&runtime, &path))
            .await
            .map_err(|e| self.load_failed(e.to_string()))?
            .map_err(|e| self.load_failed(format!("{e:#}")))?;

        info!(
            path = %self.module_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compiled conversion engine module"
        );
        Ok(compiled)
    }
}

impl Drop for WasmEngine {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

#[async_trait]
impl ConversionEngine for WasmEngine {
    async fn open(&self, document: Bytes) -> Result<Box<dyn ConversionSession>> {
        let module = self.module().await?;
        let ticks = self.deadline_ticks();

        let mut store = Store::new(&self.runtime, ());
        // With epoch interruption enabled the default deadline is zero, so
        // arm it before any guest code runs.
        store.set_epoch_deadline(ticks);

        let instance = Instance::new_async(&mut store, module, &[])
            .await
            .map_err(|e| classify_trap(e, self.export_timeout, |m| self.load_failed(m)))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| self.load_failed("module exports no `memory`"))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "engine_alloc")
            .map_err(|e| self.load_failed(format!("missing export `engine_alloc`: {e:#}")))?;
        let open_fn = instance
            .get_typed_func::<(i32, i32, i32, i32), i64>(&mut store, "session_open")
            .map_err(|e| self.load_failed(format!("missing export `session_open`: {e:#}")))?;
        let export_fn = instance
            .get_typed_func::<i64, i64>(&mut store, "session_export_pdf")
            .map_err(|e| self.load_failed(format!("missing export `session_export_pdf`: {e:#}")))?;
        let close_fn = instance
            .get_typed_func::<i64, i32>(&mut store, "session_close")
            .map_err(|e| self.load_failed(format!("missing export `session_close`: {e:#}")))?;

        let options = match &self.license {
            Some(license) => serde_json::json!({
                "licenseKey": license.key,
                "appName": license.app_name,
            }),
            None => serde_json::json!({}),
        };
        let options = serde_json::to_vec(&options).map_err(|e| EngineError::Failed {
            message: format!("could not encode engine options: {e}"),
        })?;

        let budget = self.export_timeout;
        let doc_len = guest_len(document.len())?;
        let opts_len = guest_len(options.len())?;
        let doc_ptr = write_guest_bytes(&mut store, &memory, &alloc, budget, &document).await?;
        let opts_ptr = write_guest_bytes(&mut store, &memory, &alloc, budget, &options).await?;

        let handle = open_fn
            .call_async(&mut store, (doc_ptr, doc_len, opts_ptr, opts_len))
            .await
            .map_err(|e| classify_trap(e, budget, |m| EngineError::Failed { message: format!("session_open failed: {m}") }))?;
        if handle <= 0 {
            return Err(EngineError::Failed {
                message: describe_open_code(handle),
            });
        }

        Ok(Box::new(WasmSession {
            store,
            memory,
            export_fn,
            close_fn,
            handle,
            budget,
            deadline_ticks: ticks,
            closed: false,
        }))
    }
}

struct WasmSession {
    store: Store<()>,
    memory: Memory,
    export_fn: TypedFunc<i64, i64>,
    close_fn: TypedFunc<i64, i32>,
    handle: i64,
    budget: Duration,
    deadline_ticks: u64,
    closed: bool,
}

#[async_trait]
impl ConversionSession for WasmSession {
    async fn export_pdf(&mut self) -> Result<Bytes> {
        self.store.set_epoch_deadline(self.deadline_ticks);
        let packed = self
            .export_fn
            .call_async(&mut self.store, self.handle)
            .await
            .map_err(|e| classify_trap(e, self.budget, |m| EngineError::ExportFailed { message: m }))?;
        if packed < 0 {
            return Err(EngineError::ExportFailed {
                message: format!("engine returned code {packed}"),
            });
        }

        let ptr = ((packed as u64) >> 32) as usize;
        let len = ((packed as u64) & 0xffff_ffff) as usize;
        if len == 0 {
            return Err(EngineError::ExportFailed {
                message: "engine returned an empty document".to_string(),
            });
        }
        read_guest_bytes(&self.store, &self.memory, ptr, len)
    }

    async fn close(&mut self) -> Result<()> {
        // Marked before the call: a failing close must not be retried on a
        // handle the engine may already have torn down.
        self.closed = true;
        self.store.set_epoch_deadline(self.deadline_ticks);
        let code = self
            .close_fn
            .call_async(&mut self.store, self.handle)
            .await
            .map_err(|e| classify_trap(e, self.budget, |m| EngineError::Failed { message: format!("session_close failed: {m}") }))?;
        if code != 0 {
            return Err(EngineError::Failed {
                message: format!("engine returned code {code} from session_close"),
            });
        }
        Ok(())
    }
}

impl Drop for WasmSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(handle = self.handle, "Conversion session dropped without being closed");
        }
    }
}

/// Epoch interrupts become deadline errors; everything else goes to the
/// caller-supplied constructor with the formatted cause.
fn classify_trap(err: wasmtime::Error, budget: Duration, fallback: impl FnOnce(String) -> EngineError) -> EngineError {
    if matches!(err.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
        EngineError::DeadlineExceeded { budget }
    } else {
        fallback(format!("{err:#}"))
    }
}

fn guest_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| EngineError::Failed {
        message: format!("buffer of {len} bytes does not fit the engine ABI"),
    })
}

async fn write_guest_bytes(
    store: &mut Store<()>,
    memory: &Memory,
    alloc: &TypedFunc<i32, i32>,
    budget: Duration,
    bytes: &[u8],
) -> Result<i32> {
    let len = guest_len(bytes.len())?;
    let ptr = alloc
        .call_async(&mut *store, len)
        .await
        .map_err(|e| classify_trap(e, budget, |m| EngineError::Failed { message: format!("engine_alloc failed: {m}") }))?;
    if ptr < 0 {
        return Err(EngineError::Failed {
            message: format!("engine_alloc returned {ptr}"),
        });
    }
    memory.write(&mut *store, ptr as usize, bytes).map_err(|e| EngineError::Failed {
        message: format!("write into engine memory failed: {e}"),
    })?;
    Ok(ptr)
}

fn read_guest_bytes(store: &Store<()>, memory: &Memory, ptr: usize, len: usize) -> Result<Bytes> {
    let data = memory.data(store);
    let end = ptr.checked_add(len).filter(|end| *end <= data.len()).ok_or_else(|| EngineError::ExportFailed {
        message: format!("engine returned an out-of-bounds buffer (ptr {ptr}, len {len})"),
    })?;
    Ok(Bytes::copy_from_slice(&data[ptr..end]))
}

fn describe_open_code(code: i64) -> String {
    match code {
        -1 => "engine rejected the open call arguments (code -1)".to_string(),
        -2 => "engine could not read the document (code -2)".to_string(),
        -3 => "engine does not support this document format (code -3)".to_string(),
        other => format!("engine returned code {other} from session_open"),
    }
}
