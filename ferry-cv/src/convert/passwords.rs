//! Legacy password handling
//!
//! Converted users keep their legacy hash as metadata and have their
//! destination password blanked, so the only way in is [`upgrade_password`]:
//! the first successful login against the legacy scheme stores a native hash
//! and drops the legacy metadata.

use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::batch::{HasMorePolicy, PageReport};
use super::entity::{ObjectKind, LEGACY_PASSWORD_KEY, LEGACY_PLATFORM_KEY};
use super::error::ConvertError;
use crate::destination::DestinationStore;
use crate::source::AdapterRegistry;

const HASH_SCHEME: &str = "sha256";

/// Blank the destination password of one page of users holding a legacy hash
pub async fn clean_passwords(
    store: &dyn DestinationStore,
    offset: i64,
    page_size: i64,
) -> Result<PageReport, ConvertError> {
    let users = store
        .objects_with_meta(ObjectKind::User, LEGACY_PASSWORD_KEY, offset, page_size)
        .await?;

    for (user, _) in &users {
        store.set_password_hash(*user, "").await?;
    }

    Ok(PageReport {
        rows: users.len(),
        converted: users.len(),
        has_more: HasMorePolicy::PageFullness.has_more(users.len(), page_size),
        ..PageReport::default()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordUpgrade {
    Upgraded,
    UnknownUser,
    /// User has no legacy hash; authenticate normally
    NotLegacy,
    /// Legacy hash was written by a platform that is no longer registered
    UnknownPlatform,
    Rejected,
}

impl PasswordUpgrade {
    pub fn upgraded(self) -> bool {
        self == PasswordUpgrade::Upgraded
    }
}

/// Verify `plain` against a user's legacy hash and replace it on success
pub async fn upgrade_password(
    store: &dyn DestinationStore,
    registry: &AdapterRegistry,
    login: &str,
    plain: &str,
) -> Result<PasswordUpgrade, ConvertError> {
    let Some(user) = store.find_user(login).await? else {
        return Ok(PasswordUpgrade::UnknownUser);
    };
    let Some(legacy_hash) = store.get_meta(ObjectKind::User, user, LEGACY_PASSWORD_KEY).await? else {
        return Ok(PasswordUpgrade::NotLegacy);
    };

    let platform = store
        .get_meta(ObjectKind::User, user, LEGACY_PLATFORM_KEY)
        .await?
        .unwrap_or_default();
    let adapter = match registry.create(&platform) {
        Ok(adapter) => adapter,
        Err(e) => {
            warn!(user, "Cannot verify legacy password: {}", e);
            return Ok(PasswordUpgrade::UnknownPlatform);
        }
    };

    if !adapter.authenticate_password(plain, &legacy_hash) {
        return Ok(PasswordUpgrade::Rejected);
    }

    store.set_password_hash(user, &hash_password(plain)).await?;
    store
        .delete_meta_prefix(ObjectKind::User, user, LEGACY_PASSWORD_KEY)
        .await?;
    store
        .delete_meta_prefix(ObjectKind::User, user, LEGACY_PLATFORM_KEY)
        .await?;

    info!(user, platform = %platform, "Upgraded legacy password");
    Ok(PasswordUpgrade::Upgraded)
}

/// Native destination hash: `sha256$<salt hex>$<digest hex>`
pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt: String = salt.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}${}${}", HASH_SCHEME, salt, digest(&salt, plain))
}

pub fn verify_password(plain: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(expected)) => digest(salt, plain) == expected,
        _ => false,
    }
}

fn digest(salt: &str, plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}
