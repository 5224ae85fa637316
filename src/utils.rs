use crate::webhook::Candidate;
use crate::{PipelineConfig, TriggerConfig};
use tracing::error;

// For signature verification
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
type HmacSha256 = Hmac<Sha256>;

/// Helper function for verifying GitHub webhook signature
pub fn verify_github_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    // Expected format: "sha256=..."
    let Some(git_signature) = signature_header.strip_prefix("sha256=") else {
        error!("Invalid {} header: {}", crate::webhook::SIGNATURE_HEADER, signature_header);
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // GitHub provides the signature as hex
    match hex_decode(git_signature) {
        // Constant-time comparison
        Ok(git_signature_bytes) => mac.verify_slice(&git_signature_bytes).is_ok(),
        Err(_) => {
            error!("Signature is not valid hex");
            false
        }
    }
}

/// Finds the first trigger matching the candidate's event, branch and state.
/// Returns None if there's no suitable match.
pub fn find_matching_trigger<'a>(
    config: &'a PipelineConfig,
    candidate: &Candidate,
) -> Option<&'a TriggerConfig> {
    let branch = candidate.deployment.branch();
    config.triggers.iter().find(|trigger| {
        trigger.event == candidate.event
            && trigger.matches_branch(branch)
            && trigger.matches_state(candidate.state.as_deref())
    })
}
