//! Status-code classification of bucket probes.
//!
//! A probe is two requests. The existence check (`HEAD`) decides whether the
//! bucket exists at all; for buckets that answer it successfully, an
//! anonymous listing (`GET`) decides how much is exposed.

use driftnet_core::Access;

/// What the existence check says about a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceVerdict {
    /// No such bucket at this endpoint
    NotFound,
    /// Bucket exists and denies anonymous access
    Private,
    /// Bucket exists and answered; a listing request decides the access level
    NeedsListing,
    /// Throttled or a server-side failure; nothing is known yet
    Transient,
}

/// Classify the status of the existence check.
///
/// `429` and `5xx` are transient. Other `4xx` codes mean the name is not a
/// bucket we can see, which is a definitive answer.
#[must_use]
pub fn classify_existence(status: u16) -> ExistenceVerdict {
    match status {
        200 | 301 | 302 | 307 => ExistenceVerdict::NeedsListing,
        403 => ExistenceVerdict::Private,
        429 => ExistenceVerdict::Transient,
        400..=499 => ExistenceVerdict::NotFound,
        _ => ExistenceVerdict::Transient,
    }
}

/// Classify the anonymous listing of a bucket known to exist.
///
/// `None` means the listing request itself failed on the network.
#[must_use]
pub fn classify_listing(status: Option<u16>, body: &str) -> Access {
    match status {
        Some(200) if is_bucket_listing(body) => Access::Public,
        Some(200) => Access::Accessible,
        Some(403) => Access::Private,
        Some(300..=399) => Access::Exists,
        _ => Access::Unknown,
    }
}

fn is_bucket_listing(body: &str) -> bool {
    body.contains("<ListBucketResult") || body.trim_start().starts_with("<?xml")
}
