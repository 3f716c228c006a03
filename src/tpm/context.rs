use super::{TpmError, keys};
use std::sync::{Arc, Mutex};
use tss_esapi::handles::KeyHandle;
use tss_esapi::{Context, TctiNameConf};

struct TpmContextInner {
    ctx: Mutex<Context>,
    primary: KeyHandle,
}

/// Shared ESAPI context plus the owner-hierarchy primary every key is
/// created under. Cloning shares the same context.
#[derive(Clone)]
pub struct TpmContext {
    inner: Arc<TpmContextInner>,
}

impl TpmContext {
    /// Open the resource manager at `device_path`, e.g. `/dev/tpmrm0`.
    pub fn open(device_path: &str) -> Result<Self, TpmError> {
        Self::with_tcti(&format!("device:{device_path}"))
    }

    /// Open any TCTI, e.g. `swtpm:port=2321` or `mssim:host=localhost`.
    pub fn with_tcti(tcti: &str) -> Result<Self, TpmError> {
        let tcti = tcti
            .parse::<TctiNameConf>()
            .map_err(|e| TpmError::Context(e.to_string()))?;
        let mut ctx = Context::new(tcti).map_err(|e| TpmError::Context(e.to_string()))?;
        let primary = keys::create_primary(&mut ctx)?;
        Ok(Self {
            inner: Arc::new(TpmContextInner {
                ctx: Mutex::new(ctx),
                primary,
            }),
        })
    }

    /// Run a synchronous TPM operation. Blocks; keep off async workers.
    pub fn with_ctx<F, T>(&self, f: F) -> Result<T, TpmError>
    where
        F: FnOnce(&mut Context, KeyHandle) -> Result<T, TpmError>,
    {
        let mut ctx = self
            .inner
            .ctx
            .lock()
            .map_err(|_| TpmError::Context("mutex poisoned".into()))?;
        f(&mut ctx, self.inner.primary)
    }
}
