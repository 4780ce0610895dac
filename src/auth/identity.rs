//! Certificate identity resolution.
//!
//! Extraction and matching are separate steps so callers can tell a
//! certificate that could not be read apart from one whose principal is not
//! acceptable for this host.
//!
//! # Parse modes
//! - Common Name: the subject CN is the user name, no host check.
//! - User Principal Name: SAN `otherName` (OID 1.3.6.1.4.1.311.20.2.3)
//!   holding `user@domain`; the domain must match the expected hostname
//!   and the user part becomes the identity.

use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::asn1_rs::{Error as DerError, FromDer, TaggedExplicit, Utf8String};
use x509_parser::extensions::GeneralName;

use crate::config::{CertParseMode, MtlsConfig, UpnMatchPolicy};

/// Microsoft UPN otherName type id.
pub const UPN_OID: &str = "1.3.6.1.4.1.311.20.2.3";

/// Why a certificate did not produce an identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("certificate could not be decoded: {0}")]
    Malformed(String),
    #[error("certificate has no {0}")]
    MissingField(&'static str),
    #[error("certificate usage does not allow client authentication: {0}")]
    Unusable(&'static str),
    #[error("principal '{principal}' does not match expected host '{expected}'")]
    Denied { principal: String, expected: String },
}

impl IdentityError {
    /// True for failures to read a usable principal out of the certificate,
    /// false for a readable principal rejected by policy.
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, IdentityError::Denied { .. })
    }

    /// Label used for audit logs and metrics.
    pub fn outcome(&self) -> &'static str {
        if self.is_decode_error() {
            "decode_error"
        } else {
            "denied"
        }
    }
}

/// Identity extraction settings derived from configuration.
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    pub parse_mode: CertParseMode,
    pub hostname: String,
    pub upn_match: UpnMatchPolicy,
    pub require_client_auth_usage: bool,
}

impl From<&MtlsConfig> for IdentityPolicy {
    fn from(config: &MtlsConfig) -> Self {
        Self {
            parse_mode: config.parse_mode,
            hostname: config.hostname.clone().unwrap_or_default(),
            upn_match: config.upn_match,
            require_client_auth_usage: config.require_client_auth_usage,
        }
    }
}

/// Resolve a DER encoded end-entity certificate to a local user name.
pub fn resolve_identity(der: &[u8], policy: &IdentityPolicy) -> Result<String, IdentityError> {
    let principals = extract_principals(der, policy)?;

    match policy.parse_mode {
        CertParseMode::CommonName => principals
            .into_iter()
            .next()
            .ok_or(IdentityError::MissingField("subject common name")),
        CertParseMode::UserPrincipalName => {
            let mut well_formed = principals
                .iter()
                .filter_map(|upn| split_upn(upn).map(|(user, _)| (upn, user)))
                .peekable();

            let first = match well_formed.peek() {
                Some((upn, _)) => upn.to_string(),
                None => return Err(IdentityError::Malformed("user principal name is not user@domain".into())),
            };

            well_formed
                .find(|(upn, _)| identity_matches(upn, &policy.hostname, policy.upn_match))
                .map(|(_, user)| user.to_string())
                .ok_or_else(|| IdentityError::Denied {
                    principal: first,
                    expected: policy.hostname.clone(),
                })
        }
    }
}

/// Pull the candidate principals for the configured parse mode out of a certificate.
///
/// Fails with a decode-class error when the certificate cannot be parsed,
/// lacks the field, or its key usage forbids client authentication.
pub fn extract_principals(der: &[u8], policy: &IdentityPolicy) -> Result<Vec<String>, IdentityError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| IdentityError::Malformed(e.to_string()))?;

    if policy.require_client_auth_usage {
        check_client_usage(&cert)?;
    }

    match policy.parse_mode {
        CertParseMode::CommonName => {
            let cn = cert
                .subject()
                .iter_common_name()
                .next()
                .ok_or(IdentityError::MissingField("subject common name"))?
                .as_str()
                .map_err(|e| IdentityError::Malformed(e.to_string()))?;
            if cn.is_empty() {
                return Err(IdentityError::MissingField("subject common name"));
            }
            Ok(vec![cn.to_string()])
        }
        CertParseMode::UserPrincipalName => {
            let upns = user_principal_names(&cert)?;
            if upns.is_empty() {
                return Err(IdentityError::MissingField("user principal name"));
            }
            Ok(upns)
        }
    }
}

/// Compare a principal (`user@domain` or a bare DNS name) with the expected hostname.
///
/// DNS names compare ASCII case-insensitively, one trailing dot ignored.
/// `Exact` requires equality; `DomainSuffix` requires the domain to equal
/// whole trailing labels of the host. Neither accepts a partial label, so
/// `evil-example.com` never matches `example.com`.
pub fn identity_matches(principal: &str, expected_hostname: &str, policy: UpnMatchPolicy) -> bool {
    let domain = match principal.rsplit_once('@') {
        Some((user, domain)) if !user.is_empty() => domain,
        Some(_) => return false,
        None => principal,
    };
    let domain = trim_root(domain);
    let host = trim_root(expected_hostname);
    if domain.is_empty() || host.is_empty() {
        return false;
    }

    match policy {
        UpnMatchPolicy::Exact => domain.eq_ignore_ascii_case(host),
        UpnMatchPolicy::DomainSuffix => {
            let domain_labels: Vec<&str> = domain.split('.').collect();
            let host_labels: Vec<&str> = host.split('.').collect();
            if domain_labels.len() > host_labels.len() {
                return false;
            }
            domain_labels
                .iter()
                .rev()
                .zip(host_labels.iter().rev())
                .all(|(d, h)| !d.is_empty() && d.eq_ignore_ascii_case(h))
        }
    }
}

/// Split `user@domain`; both halves must be non-empty.
pub fn split_upn(upn: &str) -> Option<(&str, &str)> {
    let (user, domain) = upn.split_once('@')?;
    if user.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some((user, domain))
}

fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

fn check_client_usage(cert: &X509Certificate<'_>) -> Result<(), IdentityError> {
    let key_usage = cert
        .key_usage()
        .map_err(|e| IdentityError::Malformed(e.to_string()))?;
    if let Some(ku) = key_usage {
        if !ku.value.digital_signature() && !ku.value.key_agreement() {
            return Err(IdentityError::Unusable("key usage lacks digitalSignature"));
        }
    }

    let ext_key_usage = cert
        .extended_key_usage()
        .map_err(|e| IdentityError::Malformed(e.to_string()))?;
    if let Some(eku) = ext_key_usage {
        if !eku.value.client_auth && !eku.value.any {
            return Err(IdentityError::Unusable("extended key usage lacks clientAuth"));
        }
    }
    Ok(())
}

fn user_principal_names(cert: &X509Certificate<'_>) -> Result<Vec<String>, IdentityError> {
    let san = cert
        .subject_alternative_name()
        .map_err(|e| IdentityError::Malformed(e.to_string()))?;
    let Some(san) = san else {
        return Err(IdentityError::MissingField("subject alternative name"));
    };

    let mut upns = Vec::new();
    for name in &san.value.general_names {
        let GeneralName::OtherName(oid, value) = name else {
            continue;
        };
        if oid.to_id_string() != UPN_OID {
            continue;
        }
        match upn_value(value) {
            Some(upn) => upns.push(upn),
            None => tracing::debug!("Skipping UPN otherName that is not a UTF8String"),
        }
    }
    Ok(upns)
}

/// Decode the `[0] EXPLICIT UTF8String` value of a UPN otherName. A bare
/// UTF8String is accepted too. Trailing bytes reject the value.
fn upn_value(raw: &[u8]) -> Option<String> {
    let (rest, upn) = match TaggedExplicit::<Utf8String, DerError, 0>::from_der(raw) {
        Ok((rest, tagged)) => (rest, tagged.into_inner()),
        Err(_) => Utf8String::from_der(raw).ok()?,
    };
    if !rest.is_empty() {
        return None;
    }
    Some(upn.as_ref().to_string())
}
