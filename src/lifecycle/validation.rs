// Input checks for new requests and rejection reasons.
//
// Each check returns the cleaned value (trimmed, canonical spelling) so the
// stored row never carries stray whitespace or mixed MAC separators.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use regex::Regex;

use super::error::ValidationError;
use crate::db::models::requests::{
    AttributePayload, CreationPayload, DeletionPayload, DnsRecordType, GroupPayload, NetworkOperation,
    NetworkPayload, PasswordPayload, RequestPayload,
};
use crate::directory::is_builtin_group;

/// Directory attributes a help-desk request may change.
pub const ATTRIBUTE_WHITELIST: &[&str] = &[
    "title",
    "department",
    "telephoneNumber",
    "mobile",
    "physicalDeliveryOfficeName",
    "company",
    "manager",
    "description",
    "displayName",
    "givenName",
    "sn",
    "mail",
    "streetAddress",
    "l",
    "st",
    "postalCode",
];

const NAME_MAX: usize = 64;
const TEXT_MAX: usize = 256;
const VALUE_MAX: usize = 1024;
const REASON_MAX: usize = 1000;

fn username_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{1,20}$").expect("username pattern"))
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"))
}

fn mac_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(([0-9A-Fa-f]{2}:){5}|([0-9A-Fa-f]{2}-){5})[0-9A-Fa-f]{2}$").expect("mac pattern")
    })
}

fn hostname_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")
            .expect("hostname pattern")
    })
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

fn optional(field: &'static str, value: Option<String>, max: usize) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required(field, v, max).map(Some),
    }
}

fn invalid(field: &'static str, value: &str) -> ValidationError {
    ValidationError::InvalidFormat { field, value: value.to_string() }
}

pub fn validate_username(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = required(field, value, 20)?;
    if !username_pattern().is_match(&value) {
        return Err(invalid(field, &value));
    }
    Ok(value)
}

pub fn validate_email(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = required(field, value, TEXT_MAX)?;
    if !email_pattern().is_match(&value) {
        return Err(invalid(field, &value));
    }
    Ok(value)
}

fn optional_email(field: &'static str, value: Option<String>) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => validate_email(field, v).map(Some),
    }
}

/// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-...`; returns upper case with colons.
pub fn validate_mac(value: &str) -> Result<String, ValidationError> {
    let value = required("mac_address", value, 17)?;
    if !mac_pattern().is_match(&value) {
        return Err(invalid("mac_address", &value));
    }
    Ok(value.replace('-', ":").to_uppercase())
}

pub fn validate_hostname(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = required(field, value, 253)?;
    if !hostname_pattern().is_match(&value) {
        return Err(invalid(field, &value));
    }
    Ok(value.to_lowercase())
}

pub fn validate_ipv4(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = required(field, value, 15)?;
    value
        .parse::<Ipv4Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| invalid(field, &value))
}

fn validate_ipv6(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = required(field, value, 45)?;
    value
        .parse::<Ipv6Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| invalid(field, &value))
}

/// Returns the whitelist spelling of `name`, matched case-insensitively.
pub fn canonical_attribute(name: &str) -> Result<&'static str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Missing { field: "attribute_name" });
    }
    ATTRIBUTE_WHITELIST
        .iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(name))
        .copied()
        .ok_or_else(|| ValidationError::AttributeNotAllowed(name.to_string()))
}

pub fn validate_group_name(value: &str) -> Result<String, ValidationError> {
    let value = required("group_name", value, NAME_MAX)?;
    if is_builtin_group(&value) {
        return Err(ValidationError::BuiltInGroup(value));
    }
    Ok(value)
}

pub fn validate_reason(reason: &str) -> Result<String, ValidationError> {
    required("reason", reason, REASON_MAX)
}

fn creation(p: CreationPayload) -> Result<CreationPayload, ValidationError> {
    if p.company_id <= 0 {
        return Err(ValidationError::Missing { field: "company_id" });
    }
    Ok(CreationPayload {
        company_id: p.company_id,
        first_name: required("first_name", &p.first_name, NAME_MAX)?,
        last_name: required("last_name", &p.last_name, NAME_MAX)?,
        display_name: optional("display_name", p.display_name, TEXT_MAX)?,
        username: validate_username("username", &p.username)?,
        email: optional_email("email", p.email)?,
        title: optional("title", p.title, TEXT_MAX)?,
        department: optional("department", p.department, TEXT_MAX)?,
        phone: optional("phone", p.phone, NAME_MAX)?,
        manager: optional("manager", p.manager, TEXT_MAX)?,
    })
}

fn deletion(p: DeletionPayload) -> Result<DeletionPayload, ValidationError> {
    Ok(DeletionPayload {
        username: validate_username("username", &p.username)?,
        display_name: optional("display_name", p.display_name, TEXT_MAX)?,
        reason: optional("reason", p.reason, REASON_MAX)?,
    })
}

fn attribute(p: AttributePayload) -> Result<AttributePayload, ValidationError> {
    Ok(AttributePayload {
        username: validate_username("username", &p.username)?,
        attribute_name: canonical_attribute(&p.attribute_name)?.to_string(),
        old_value: optional("old_value", p.old_value, VALUE_MAX)?,
        new_value: required("new_value", &p.new_value, VALUE_MAX)?,
    })
}

fn password(p: PasswordPayload) -> Result<PasswordPayload, ValidationError> {
    Ok(PasswordPayload {
        username: validate_username("username", &p.username)?,
        display_name: optional("display_name", p.display_name, TEXT_MAX)?,
        email: optional_email("email", p.email)?,
    })
}

fn group(p: GroupPayload) -> Result<GroupPayload, ValidationError> {
    Ok(GroupPayload {
        username: validate_username("username", &p.username)?,
        group_name: validate_group_name(&p.group_name)?,
        action_type: p.action_type,
    })
}

fn network(p: NetworkPayload) -> Result<NetworkPayload, ValidationError> {
    let hostname = validate_hostname("hostname", &p.hostname)?;
    match p.operation {
        NetworkOperation::DhcpReservation => {
            let mac = p.mac_address.ok_or(ValidationError::Missing { field: "mac_address" })?;
            let ip = p.ip_address.ok_or(ValidationError::Missing { field: "ip_address" })?;
            Ok(NetworkPayload {
                operation: p.operation,
                hostname,
                ip_address: Some(validate_ipv4("ip_address", &ip)?),
                mac_address: Some(validate_mac(&mac)?),
                record_type: None,
                record_value: None,
            })
        }
        NetworkOperation::DnsRecord => {
            let record_type = p.record_type.ok_or(ValidationError::Missing { field: "record_type" })?;
            let value = p.record_value.ok_or(ValidationError::Missing { field: "record_value" })?;
            let record_value = match record_type {
                DnsRecordType::A => validate_ipv4("record_value", &value)?,
                DnsRecordType::AAAA => validate_ipv6("record_value", &value)?,
                DnsRecordType::CNAME | DnsRecordType::PTR => validate_hostname("record_value", &value)?,
            };
            let ip_address = match p.ip_address.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(ip) => Some(
                    ip.parse::<IpAddr>()
                        .map(|ip| ip.to_string())
                        .map_err(|_| invalid("ip_address", ip))?,
                ),
            };
            Ok(NetworkPayload {
                operation: p.operation,
                hostname,
                ip_address,
                mac_address: None,
                record_type: Some(record_type),
                record_value: Some(record_value),
            })
        }
    }
}

/// Checks a new request and returns its cleaned payload.
pub fn validate_payload(payload: RequestPayload) -> Result<RequestPayload, ValidationError> {
    Ok(match payload {
        RequestPayload::Creation(p) => RequestPayload::Creation(creation(p)?),
        RequestPayload::Deletion(p) => RequestPayload::Deletion(deletion(p)?),
        RequestPayload::Attribute(p) => RequestPayload::Attribute(attribute(p)?),
        RequestPayload::Password(p) => RequestPayload::Password(password(p)?),
        RequestPayload::Group(p) => RequestPayload::Group(group(p)?),
        RequestPayload::Network(p) => RequestPayload::Network(network(p)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::requests::GroupAction;

    fn dhcp(mac: &str, ip: &str) -> RequestPayload {
        RequestPayload::Network(NetworkPayload {
            operation: NetworkOperation::DhcpReservation,
            hostname: "PRN-042.corp.local".into(),
            ip_address: Some(ip.into()),
            mac_address: Some(mac.into()),
            record_type: None,
            record_value: None,
        })
    }

    #[test]
    fn usernames_follow_the_account_name_rules() {
        assert_eq!(validate_username("username", " j.doe-2 ").unwrap(), "j.doe-2");
        assert!(validate_username("username", "jane doe").is_err());
        assert!(validate_username("username", "a_very_long_account_name").is_err());
        assert_eq!(
            validate_username("username", "  "),
            Err(ValidationError::Missing { field: "username" })
        );
    }

    #[test]
    fn mac_addresses_are_canonicalized() {
        assert_eq!(validate_mac("aa-bb-cc-dd-ee-0f").unwrap(), "AA:BB:CC:DD:EE:0F");
        assert!(validate_mac("aa:bb-cc:dd:ee:ff").is_err());
        assert!(validate_mac("aa:bb:cc:dd:ee").is_err());
    }

    #[test]
    fn dhcp_reservation_needs_mac_and_ipv4() {
        let RequestPayload::Network(p) = validate_payload(dhcp("00:1a:2b:3c:4d:5e", "10.0.4.20")).unwrap() else {
            panic!("expected a network payload");
        };
        assert_eq!(p.hostname, "prn-042.corp.local");
        assert_eq!(p.mac_address.as_deref(), Some("00:1A:2B:3C:4D:5E"));

        assert!(matches!(
            validate_payload(dhcp("00:1a:2b:3c:4d:5e", "10.0.4.300")),
            Err(ValidationError::InvalidFormat { field: "ip_address", .. })
        ));
    }

    #[test]
    fn dns_record_value_depends_on_record_type() {
        let record = |record_type, value: &str| {
            validate_payload(RequestPayload::Network(NetworkPayload {
                operation: NetworkOperation::DnsRecord,
                hostname: "intranet".into(),
                ip_address: None,
                mac_address: None,
                record_type: Some(record_type),
                record_value: Some(value.into()),
            }))
        };
        assert!(record(DnsRecordType::A, "10.1.1.1").is_ok());
        assert!(record(DnsRecordType::A, "fe80::1").is_err());
        assert!(record(DnsRecordType::AAAA, "fe80::1").is_ok());
        assert!(record(DnsRecordType::CNAME, "web01.corp.local").is_ok());
        assert!(record(DnsRecordType::CNAME, "not a host").is_err());
    }

    #[test]
    fn attribute_names_are_whitelisted() {
        assert_eq!(canonical_attribute("TelephoneNumber").unwrap(), "telephoneNumber");
        assert_eq!(
            canonical_attribute("userAccountControl"),
            Err(ValidationError::AttributeNotAllowed("userAccountControl".into()))
        );
    }

    #[test]
    fn builtin_groups_are_refused() {
        let payload = RequestPayload::Group(GroupPayload {
            username: "jdoe".into(),
            group_name: "Domain Admins".into(),
            action_type: GroupAction::Add,
        });
        assert_eq!(
            validate_payload(payload),
            Err(ValidationError::BuiltInGroup("Domain Admins".into()))
        );
    }

    #[test]
    fn creation_requires_names_and_company() {
        let payload = CreationPayload {
            company_id: 0,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            display_name: None,
            username: "jdoe".into(),
            email: Some("".into()),
            title: None,
            department: None,
            phone: None,
            manager: None,
        };
        assert_eq!(
            validate_payload(RequestPayload::Creation(payload.clone())),
            Err(ValidationError::Missing { field: "company_id" })
        );

        let cleaned = validate_payload(RequestPayload::Creation(CreationPayload { company_id: 1, ..payload })).unwrap();
        let RequestPayload::Creation(cleaned) = cleaned else {
            panic!("expected a creation payload");
        };
        assert_eq!(cleaned.email, None);
    }

    #[test]
    fn rejection_reason_must_not_be_blank() {
        assert_eq!(validate_reason("  "), Err(ValidationError::Missing { field: "reason" }));
        assert_eq!(validate_reason(" duplicate ").unwrap(), "duplicate");
    }
}
