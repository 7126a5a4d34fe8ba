//! API-key verification for the tenant authentication gate.
//!
//! Keys are minted once at tenant creation and only their SHA-256 digest is
//! stored. Verification hashes the presented key and compares digests with a
//! constant-time fold, so neither the stored hash length nor an early byte
//! mismatch leaks through timing.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::domain::tenant::{Tenant, TenantStatus};
use crate::errors::AuthError;
use crate::tenant_config::TenantSecrets;

const KEY_RANDOM_LEN: usize = 32;
const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Lowercase hex SHA-256 of the raw key. This is the only form that is ever
/// persisted.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn verify_api_key(presented: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_api_key(presented).as_bytes(), stored_hash.as_bytes())
}

/// Mint a new key in the `{slug}_live_{random}` shape. The caller shows it
/// to the operator exactly once and persists only [`hash_api_key`] of it.
pub fn generate_api_key(slug: &str) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..KEY_RANDOM_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("{}_live_{}", tenant_prefix(slug), random)
}

/// Slugs may carry hyphens; key prefixes normalize them away so a key never
/// contains a separator that could be confused with its own `_live_` marker.
pub fn tenant_prefix(slug: &str) -> String {
    slug.chars().map(|c| if c == '-' { '_' } else { c }).collect()
}

/// Full gate decision for one resolved tenant. Suspension wins over key
/// checks: a suspended tenant is rejected even with a valid key. A tenant
/// with no key hash on file cannot authenticate at all.
pub fn authenticate(
    tenant: &Tenant,
    secrets: &TenantSecrets,
    presented: &str,
) -> Result<(), AuthError> {
    if tenant.status == TenantStatus::Suspended {
        return Err(AuthError::TenantSuspended { slug: tenant.slug.clone() });
    }
    let Some(stored_hash) = secrets.api_key_hash() else {
        return Err(AuthError::KeyMismatch { slug: tenant.slug.clone() });
    };
    if !verify_api_key(presented, stored_hash) {
        return Err(AuthError::KeyMismatch { slug: tenant.slug.clone() });
    }
    Ok(())
}
