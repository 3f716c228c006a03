pub mod attestation;
pub mod authenticator;
pub mod key_handle;
pub mod message;

pub use attestation::{AttestationConfig, AttestationMode};
pub use authenticator::Authenticator;
pub use key_handle::{DeviceIdentifier, KeyHandle};
pub use message::{AuthenticateRequest, AuthenticateResponse, RegisterRequest, RegisterResponse};
