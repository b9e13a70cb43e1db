//! Selection of the most recently issued secret
//!
//! Rotated secrets carry an `issued-at-time` label holding the Unix time they
//! were issued at. Secrets without the label are legacy entries and ignored.

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

use crate::{Error, Result};

/// Label holding the issue time of a secret in Unix seconds
pub const LABEL_ISSUED_AT_TIME: &str = "issued-at-time";

/// Return the secret with the greatest `issued-at-time`
///
/// Unlabelled secrets are skipped. When several secrets share the maximal
/// timestamp the first one in input order is returned.
pub fn latest_issued_secret(secrets: &[Secret]) -> Result<&Secret> {
    let mut latest: Option<(i64, &Secret)> = None;

    for secret in secrets {
        let Some(raw) = secret.labels().get(LABEL_ISSUED_AT_TIME) else {
            continue;
        };
        let issued_at: i64 = raw.parse().map_err(|_| Error::MalformedTimestamp {
            secret: secret.name_any(),
            value: raw.clone(),
        })?;

        match latest {
            Some((best, _)) if best >= issued_at => {}
            _ => latest = Some((issued_at, secret)),
        }
    }

    latest
        .map(|(_, secret)| secret)
        .ok_or_else(|| Error::not_found("secret", LABEL_ISSUED_AT_TIME))
}
