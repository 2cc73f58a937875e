//! DNS record planning
//!
//! Pure mapping from (server IP, name servers) to the record set a
//! provisioned domain needs, plus the propagation check the worker runs
//! against what the provider reports back. No I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Default TTL for planned records (seconds)
pub const DEFAULT_RECORD_TTL: u32 = 3600;

/// Apex record name
pub const APEX: &str = "@";

/// `www` record name
pub const WWW: &str = "www";

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address
    A,
    /// IPv6 address
    Aaaa,
    /// Name server
    Ns,
}

impl RecordType {
    /// Address record type for an IP
    pub fn for_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Ns => "NS",
        };
        f.write_str(name)
    }
}

/// A single DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Record name relative to the zone ("@", "www", ...)
    pub name: String,
    /// Record data (address or host name)
    pub data: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl DnsRecord {
    /// Create a record
    pub fn new(
        record_type: RecordType,
        name: impl Into<String>,
        data: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            record_type,
            name: name.into(),
            data: data.into(),
            ttl,
        }
    }
}

/// Plan the record set for a domain using [`DEFAULT_RECORD_TTL`]
pub fn plan(server_ip: IpAddr, name_servers: &[String]) -> Vec<DnsRecord> {
    plan_with_ttl(server_ip, name_servers, DEFAULT_RECORD_TTL)
}

/// Plan the record set for a domain
///
/// Always two address records (`@` and `www`) followed by one apex `NS`
/// record per name server, in order.
pub fn plan_with_ttl(server_ip: IpAddr, name_servers: &[String], ttl: u32) -> Vec<DnsRecord> {
    let address_type = RecordType::for_ip(server_ip);
    let address = server_ip.to_string();

    let mut records = Vec::with_capacity(2 + name_servers.len());
    records.push(DnsRecord::new(address_type, APEX, address.clone(), ttl));
    records.push(DnsRecord::new(address_type, WWW, address, ttl));
    records.extend(
        name_servers
            .iter()
            .map(|ns| DnsRecord::new(RecordType::Ns, APEX, ns.clone(), ttl)),
    );
    records
}

/// Why an observed record set does not match the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationMismatch {
    /// Record names whose address is missing or wrong
    pub missing: Vec<String>,
}

impl fmt::Display for PropagationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "address records not yet propagated for: {}",
            self.missing.join(", ")
        )
    }
}

/// Compare an observed record set against the plan
///
/// Passes only when every planned address record (`@` and `www`) has an
/// observed record of the same type and name whose address equals the
/// planned one. Extra observed records are ignored; NS records are not
/// checked.
pub fn check_propagation(
    planned: &[DnsRecord],
    observed: &[DnsRecord],
) -> Result<(), PropagationMismatch> {
    let missing: Vec<String> = planned
        .iter()
        .filter(|r| matches!(r.record_type, RecordType::A | RecordType::Aaaa))
        .filter(|want| {
            !observed.iter().any(|got| {
                got.record_type == want.record_type
                    && got.name == want.name
                    && same_address(&got.data, &want.data)
            })
        })
        .map(|r| r.name.clone())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PropagationMismatch { missing })
    }
}

// IPv6 text forms vary ("2001:db8::1" vs "2001:0db8:0:0::1").
fn same_address(observed: &str, planned: &str) -> bool {
    match (observed.trim().parse::<IpAddr>(), planned.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => observed.trim() == planned,
    }
}
