//! Certificate fingerprints.
//!
//! `register` hashes a canonical JSON encoding of the certificate's identity
//! fields with SHA-256 and stores the hex digest with the time it was taken.
//! `verify` reports the stored digest. The digest only makes tampering with
//! those fields evident; nothing is written to any ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::store::{CertificateRecord, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateAction {
    Register,
    Verify,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHashRequest {
    pub certificate_id: Uuid,
    pub action: CertificateAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    pub certificate_id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub issued_at: DateTime<Utc>,
    pub verification_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub hash: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub certificate: CertificateSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CertificateHashResponse {
    Registered(RegisterResponse),
    Verified(VerifyResponse),
}

/// Field order here is the canonical order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalCertificate<'a> {
    certificate_id: String,
    user_id: &'a str,
    course_id: &'a str,
    issued_at: String,
    verification_code: &'a str,
}

/// Compact canonical JSON of the fingerprinted fields.
pub fn canonical_json(certificate: &CertificateRecord) -> Result<Vec<u8>, FunctionError> {
    let canonical = CanonicalCertificate {
        certificate_id: certificate.id.to_string(),
        user_id: &certificate.user_id,
        course_id: &certificate.course_id,
        issued_at: certificate
            .issued_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        verification_code: &certificate.verification_code,
    };
    serde_json::to_vec(&canonical)
        .map_err(|e| FunctionError::Unknown(format!("canonical encoding failed: {e}")))
}

/// Lowercase hex SHA-256 of [`canonical_json`].
pub fn fingerprint(certificate: &CertificateRecord) -> Result<String, FunctionError> {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(certificate)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `caller` is required for `register` and ignored for `verify`.
pub async fn certificate_hash(
    store: &dyn Store,
    caller: Option<&AuthUser>,
    request: CertificateHashRequest,
) -> Result<CertificateHashResponse, FunctionError> {
    let certificate = store
        .get_certificate(request.certificate_id)
        .await?
        .ok_or_else(|| FunctionError::not_found(format!("certificate {}", request.certificate_id)))?;

    match request.action {
        CertificateAction::Register => {
            let caller = caller.ok_or_else(|| FunctionError::unauthorized("missing bearer token"))?;
            if caller.user_id != certificate.user_id {
                return Err(FunctionError::unauthorized(
                    "certificate belongs to another user",
                ));
            }
            register(store, &certificate).await
        }
        CertificateAction::Verify => Ok(CertificateHashResponse::Verified(verify(certificate))),
    }
}

async fn register(
    store: &dyn Store,
    certificate: &CertificateRecord,
) -> Result<CertificateHashResponse, FunctionError> {
    let hash = fingerprint(certificate)?;
    let timestamp = Utc::now();
    store
        .set_certificate_fingerprint(certificate.id, &hash, timestamp)
        .await?
        .ok_or_else(|| FunctionError::not_found(format!("certificate {}", certificate.id)))?;

    log::info!("Registered fingerprint for certificate {}", certificate.id);
    Ok(CertificateHashResponse::Registered(RegisterResponse {
        success: true,
        hash,
        timestamp,
    }))
}

fn verify(certificate: CertificateRecord) -> VerifyResponse {
    VerifyResponse {
        verified: certificate.blockchain_hash.is_some(),
        hash: certificate.blockchain_hash,
        timestamp: certificate.blockchain_timestamp,
        certificate: CertificateSummary {
            certificate_id: certificate.id,
            user_id: certificate.user_id,
            course_id: certificate.course_id,
            issued_at: certificate.issued_at,
            verification_code: certificate.verification_code,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn certificate() -> CertificateRecord {
        CertificateRecord {
            id: Uuid::parse_str("5f1c3a9e-2b4d-4e6f-8a1b-9c0d2e3f4a5b").unwrap(),
            user_id: "u1".into(),
            course_id: "rust-101".into(),
            issued_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            verification_code: "CERT-42".into(),
            blockchain_hash: None,
            blockchain_timestamp: None,
        }
    }

    fn owner() -> AuthUser {
        AuthUser {
            user_id: "u1".into(),
        }
    }

    fn request(cert: &CertificateRecord, action: CertificateAction) -> CertificateHashRequest {
        CertificateHashRequest {
            certificate_id: cert.id,
            action,
        }
    }

    #[test]
    fn test_canonical_json_key_order() {
        let json = String::from_utf8(canonical_json(&certificate()).unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"certificateId":"5f1c3a9e-2b4d-4e6f-8a1b-9c0d2e3f4a5b","userId":"u1","courseId":"rust-101","issuedAt":"2024-03-01T12:00:00.000Z","verificationCode":"CERT-42"}"#
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let cert = certificate();
        let a = fingerprint(&cert).unwrap();
        let b = fingerprint(&cert).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut other = cert.clone();
        other.verification_code = "CERT-43".into();
        assert_ne!(fingerprint(&other).unwrap(), a);

        // Stored fingerprint fields do not feed the digest
        let mut stamped = cert;
        stamped.blockchain_timestamp = Some(Utc::now());
        assert_eq!(fingerprint(&stamped).unwrap(), a);
    }

    #[tokio::test]
    async fn test_verify_before_register() {
        let store = MemoryStore::new();
        let cert = certificate();
        store.issue_certificate(&cert).await.unwrap();

        let response = certificate_hash(&store, None, request(&cert, CertificateAction::Verify))
            .await
            .unwrap();
        match response {
            CertificateHashResponse::Verified(v) => {
                assert!(!v.verified);
                assert!(v.hash.is_none());
                assert_eq!(v.certificate.course_id, "rust-101");
            }
            other => panic!("expected verify response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let store = MemoryStore::new();
        let cert = certificate();
        store.issue_certificate(&cert).await.unwrap();

        let registered = match certificate_hash(&store, Some(&owner()), request(&cert, CertificateAction::Register))
            .await
            .unwrap()
        {
            CertificateHashResponse::Registered(r) => r,
            other => panic!("expected register response, got {other:?}"),
        };
        assert!(registered.success);
        assert_eq!(registered.hash, fingerprint(&cert).unwrap());

        let again = match certificate_hash(&store, Some(&owner()), request(&cert, CertificateAction::Register))
            .await
            .unwrap()
        {
            CertificateHashResponse::Registered(r) => r,
            other => panic!("expected register response, got {other:?}"),
        };
        assert_eq!(again.hash, registered.hash);

        match certificate_hash(&store, None, request(&cert, CertificateAction::Verify))
            .await
            .unwrap()
        {
            CertificateHashResponse::Verified(v) => {
                assert!(v.verified);
                assert_eq!(v.hash, Some(registered.hash));
                assert_eq!(v.timestamp, Some(again.timestamp));
            }
            other => panic!("expected verify response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_requires_owner() {
        let store = MemoryStore::new();
        let cert = certificate();
        store.issue_certificate(&cert).await.unwrap();

        let stranger = AuthUser {
            user_id: "u9".into(),
        };
        let result =
            certificate_hash(&store, Some(&stranger), request(&cert, CertificateAction::Register)).await;
        assert!(matches!(result, Err(FunctionError::Unauthorized(_))));

        let result = certificate_hash(&store, None, request(&cert, CertificateAction::Register)).await;
        assert!(matches!(result, Err(FunctionError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_unknown_certificate() {
        let store = MemoryStore::new();
        let result = certificate_hash(
            &store,
            None,
            CertificateHashRequest {
                certificate_id: Uuid::new_v4(),
                action: CertificateAction::Verify,
            },
        )
        .await;
        assert!(matches!(result, Err(FunctionError::NotFound(_))));
    }

    #[test]
    fn test_request_wire_format() {
        let request: CertificateHashRequest = serde_json::from_str(
            r#"{"certificateId":"5f1c3a9e-2b4d-4e6f-8a1b-9c0d2e3f4a5b","action":"verify"}"#,
        )
        .unwrap();
        assert_eq!(request.action, CertificateAction::Verify);
    }
}
