pub mod config;
pub mod counter;
pub(crate) mod der;
pub mod error;
pub mod keystore;
pub(crate) mod persist;
pub mod pgp;
#[cfg(feature = "tpm")]
pub mod tpm;
pub mod u2f;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use rand::RngCore;
use zeroize::Zeroizing;

use config::{Backend, Command, Config};
use counter::FileCounterStore;
use keystore::{FileKeyStore, KeyStore};
use u2f::{AttestationConfig, AuthenticateRequest, Authenticator, RegisterRequest};

const SEAL_KEY_FILE: &str = "seal.key";
const COUNTERS_FILE: &str = "counters.cbor";
const KEYS_DIR: &str = "keys";

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();

    let data_dir = data_dir(&cfg)?;
    std::fs::create_dir_all(&data_dir)?;

    // Single-instance lock over the data directory
    let lock_path = data_dir.join("keyward.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!("keyward is already running (lock: {})", lock_path.display())
    })?;
    tracing::debug!(data_dir = %data_dir.display(), backend = ?cfg.backend, "Starting keyward");

    if let Command::Wipe = cfg.command {
        return wipe(&data_dir);
    }

    match cfg.backend {
        Backend::File => {
            let seal_key = load_or_create_seal_key(&data_dir.join(SEAL_KEY_FILE))?;
            let keys = FileKeyStore::open(*seal_key, data_dir.join(KEYS_DIR))
                .context("failed to open key store")?;
            execute(keys, &data_dir, cfg).await
        }
        Backend::Tpm => open_tpm_and_execute(&data_dir, cfg).await,
    }
}

#[cfg(feature = "tpm")]
async fn open_tpm_and_execute(data_dir: &Path, cfg: Config) -> anyhow::Result<()> {
    let device = cfg.tpm_device.clone();
    let dir = data_dir.to_path_buf();
    let keys = tokio::task::spawn_blocking(move || {
        let ctx = tpm::TpmContext::open(&device)?;
        tracing::info!(device = %device, "TPM context initialized");
        Ok::<_, anyhow::Error>(tpm::TpmKeyStore::open(ctx, &dir)?)
    })
    .await??;
    execute(keys, data_dir, cfg).await
}

#[cfg(not(feature = "tpm"))]
async fn open_tpm_and_execute(_data_dir: &Path, _cfg: Config) -> anyhow::Result<()> {
    anyhow::bail!("keyward was built without TPM support; rebuild with `--features tpm`")
}

async fn execute<K>(keys: K, data_dir: &Path, cfg: Config) -> anyhow::Result<()>
where
    K: KeyStore + 'static,
{
    let counters = FileCounterStore::open(data_dir.join(COUNTERS_FILE))
        .context("failed to open counter store")?;
    let attestation = AttestationConfig {
        mode: cfg.attestation,
        common_name: cfg.attestation_name,
    };
    let authenticator = Arc::new(Authenticator::new(keys, counters, attestation));

    match cfg.command {
        Command::Register { app_id, challenge } => {
            let req = RegisterRequest {
                app_id,
                challenge: decode_hex(&challenge, 32, "--challenge")?,
            };
            let auth = authenticator.clone();
            let resp = tokio::task::spawn_blocking(move || auth.register(&req)).await??;
            println!("key_handle: {}", hex::encode(resp.key_handle.as_bytes()));
            println!("response:   {}", hex::encode(resp.to_raw_message()));
        }
        Command::Authenticate {
            app_id,
            challenge,
            key_handle,
        } => {
            let req = AuthenticateRequest {
                app_id,
                challenge: decode_hex(&challenge, 32, "--challenge")?,
                key_handle: decode_hex(&key_handle, u2f::key_handle::KEY_HANDLE_LEN, "--key-handle")?,
            };
            let auth = authenticator.clone();
            let resp = tokio::task::spawn_blocking(move || auth.authenticate(&req)).await??;
            println!("counter:  {}", resp.counter);
            println!("response: {}", hex::encode(resp.to_raw_message()));
        }
        Command::DeviceId => {
            let auth = authenticator.clone();
            let id = tokio::task::spawn_blocking(move || auth.device_identifier()).await??;
            println!("{}", hex::encode(id));
        }
        Command::Wipe => wipe(data_dir)?,
    }
    Ok(())
}

/// Delete every key entry and all counters. Sealed storage keys are kept so
/// the directory stays usable with the same backend.
pub fn wipe(data_dir: &Path) -> anyhow::Result<()> {
    let keys_dir = data_dir.join(KEYS_DIR);
    let count = keystore::disk::remove_all(&keys_dir)?;
    println!("Deleted {count} key(s) from {}", keys_dir.display());

    let counters = data_dir.join(COUNTERS_FILE);
    if counters.exists() {
        std::fs::remove_file(&counters)?;
        println!("Deleted counters at {}", counters.display());
    }
    Ok(())
}

fn data_dir(cfg: &Config) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &cfg.data_dir {
        return Ok(dir.clone());
    }
    Ok(directories::ProjectDirs::from("", "", config::APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine XDG data dir"))?
        .data_dir()
        .to_path_buf())
}

/// Read the software backend's sealing key, creating it on first use.
fn load_or_create_seal_key(path: &Path) -> anyhow::Result<Zeroizing<[u8; 32]>> {
    if path.exists() {
        let bytes = Zeroizing::new(std::fs::read(path)?);
        let mut key = Zeroizing::new([0u8; 32]);
        if bytes.len() != key.len() {
            anyhow::bail!("{} is {} bytes, expected 32", path.display(), bytes.len());
        }
        key.copy_from_slice(&bytes);
        return Ok(key);
    }
    let mut key = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    persist::write_atomic(path, &key[..])?;
    restrict_permissions(path)?;
    tracing::info!(path = %path.display(), "Created storage key");
    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn decode_hex(s: &str, len: usize, what: &str) -> anyhow::Result<Vec<u8>> {
    let bytes = hex::decode(s.trim()).with_context(|| format!("{what} is not valid hex"))?;
    if bytes.len() != len {
        anyhow::bail!("{what} must be {len} bytes, got {}", bytes.len());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_checks_length() {
        assert_eq!(decode_hex("00ff", 2, "x").unwrap(), [0x00u8, 0xff]);
        assert!(decode_hex("00", 2, "x").is_err());
        assert!(decode_hex("zz", 1, "x").is_err());
    }

    #[test]
    fn test_seal_key_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEAL_KEY_FILE);
        let first = load_or_create_seal_key(&path).unwrap();
        let second = load_or_create_seal_key(&path).unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_seal_key_wrong_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEAL_KEY_FILE);
        std::fs::write(&path, [1u8; 16]).unwrap();
        assert!(load_or_create_seal_key(&path).is_err());
    }

    #[test]
    fn test_wipe_removes_keys_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let keys = FileKeyStore::open([5u8; 32], dir.path().join(KEYS_DIR)).unwrap();
        keys.generate_or_load("a", "a").unwrap();
        std::fs::write(dir.path().join(COUNTERS_FILE), b"x").unwrap();
        std::fs::write(dir.path().join(SEAL_KEY_FILE), [0u8; 32]).unwrap();

        wipe(dir.path()).unwrap();
        assert!(keys.load("a").is_err());
        assert!(!dir.path().join(COUNTERS_FILE).exists());
        assert!(dir.path().join(SEAL_KEY_FILE).exists());
    }
}
