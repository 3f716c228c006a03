use std::path::PathBuf;

use crate::u2f::AttestationMode;

/// Directory name under the XDG data dir when `--data-dir` is not given.
pub const APP_NAME: &str = "keyward";

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// AES-GCM sealed software keys.
    #[default]
    File,
    /// TPM 2.0 wrapped keys (requires the `tpm` feature).
    Tpm,
}

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "keyward", version, about = "Hardware-backed U2F authenticator")]
pub struct Config {
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[arg(long, global = true, value_enum, default_value_t = Backend::File)]
    pub backend: Backend,
    #[arg(long, global = true, default_value = "/dev/tpmrm0")]
    pub tpm_device: String,
    /// Defaults to the XDG data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = AttestationMode::SelfSigned)]
    pub attestation: AttestationMode,
    #[arg(long, global = true, default_value = crate::u2f::attestation::DEFAULT_COMMON_NAME)]
    pub attestation_name: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a credential for an application id.
    Register {
        #[arg(long)]
        app_id: String,
        /// 32-byte client data hash, hex.
        #[arg(long)]
        challenge: String,
    },
    /// Sign a challenge with an existing credential.
    Authenticate {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        challenge: String,
        /// Key handle returned by `register`, hex.
        #[arg(long)]
        key_handle: String,
    },
    /// Print the device identifier.
    DeviceId,
    /// Delete all stored keys and counters, then exit.
    Wipe,
}
