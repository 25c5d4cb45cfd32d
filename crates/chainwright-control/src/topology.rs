//! Topology input parsing.
//!
//! Operators describe a chain as one line per host assignment. Two forms
//! are accepted:
//!
//! ```text
//! 10.0.0.1:agencyA:2:{1,2}          canonical
//! 10.0.0.1:2 agencyA 1,2 [ports]    bootstrap-tool form
//! ```
//!
//! Lines in neither form are treated as comments.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::remote::RemoteHost;
use crate::types::GroupId;

/// One host assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLine {
    /// Host address.
    pub ip: String,
    /// Agency owning the host.
    pub agency_name: String,
    /// Number of nodes to place on the host. Validated by [`parse_topology`].
    pub node_count: i64,
    /// Groups every node on this line joins.
    pub group_ids: BTreeSet<GroupId>,
    /// Port overrides passed through to the bootstrap tool verbatim.
    pub ports: Option<String>,
}

impl ConfigLine {
    /// Parse a single line, returning `None` for anything unrecognised.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        // Only the canonical form carries a braced group list.
        if line.ends_with('}') {
            Self::parse_canonical(line)
        } else {
            Self::parse_tool_form(line)
        }
    }

    fn parse_canonical(line: &str) -> Option<Self> {
        let mut parts = line.splitn(4, ':');
        let ip = valid_ip(parts.next()?)?;
        let agency_name = valid_agency(parts.next()?)?;
        let node_count = parts.next()?.trim().parse().ok()?;
        let groups = parts
            .next()?
            .trim()
            .strip_prefix('{')?
            .strip_suffix('}')?;

        Some(Self {
            ip,
            agency_name,
            node_count,
            group_ids: parse_groups(groups)?,
            ports: None,
        })
    }

    fn parse_tool_form(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let (ip, count) = fields.next()?.split_once(':')?;
        let agency_name = valid_agency(fields.next()?)?;
        let group_ids = parse_groups(fields.next()?)?;
        let ports = fields.next().map(ToOwned::to_owned);
        if fields.next().is_some() {
            return None;
        }

        Some(Self {
            ip: valid_ip(ip)?,
            agency_name,
            node_count: count.parse().ok()?,
            group_ids,
            ports,
        })
    }

    /// Render in the form the bootstrap tool consumes.
    #[must_use]
    pub fn to_tool_line(&self) -> String {
        let mut line = format!("{}:{} {} {}", self.ip, self.node_count, self.agency_name, self.groups_csv());
        if let Some(ports) = &self.ports {
            line.push(' ');
            line.push_str(ports);
        }
        line
    }

    fn groups_csv(&self) -> String {
        self.group_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{{{}}}",
            self.ip,
            self.agency_name,
            self.node_count,
            self.groups_csv()
        )
    }
}

fn valid_ip(raw: &str) -> Option<String> {
    let raw = raw.trim();
    raw.parse::<Ipv4Addr>().ok().map(|_| raw.to_owned())
}

fn valid_agency(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let ok = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    ok.then(|| raw.to_owned())
}

fn parse_groups(raw: &str) -> Option<BTreeSet<GroupId>> {
    let groups = raw
        .split(',')
        .map(|g| g.trim().parse::<i32>().ok().filter(|g| *g > 0).map(GroupId::new))
        .collect::<Option<BTreeSet<_>>>()?;
    (!groups.is_empty()).then_some(groups)
}

/// Parse and validate operator topology input.
///
/// Every accepted line is checked for agency consistency, SSH reachability
/// and a positive node count, in that order.
pub async fn parse_topology(
    lines: &[String],
    remote: &dyn RemoteHost,
) -> DeployResult<Vec<ConfigLine>> {
    let mut host_agency: HashMap<String, String> = HashMap::new();
    let mut parsed = Vec::new();

    for raw in lines {
        if raw.trim().is_empty() {
            continue;
        }
        let Some(line) = ConfigLine::parse(raw) else {
            debug!(line = %raw, "skipping unrecognised topology line");
            continue;
        };

        if let Some(existing) = host_agency.get(&line.ip) {
            if !existing.eq_ignore_ascii_case(&line.agency_name) {
                return Err(DeployError::HostAgencyConflict {
                    ip: line.ip,
                    existing: existing.clone(),
                    requested: line.agency_name,
                });
            }
        }
        host_agency.insert(line.ip.clone(), line.agency_name.clone());

        if !remote.connect(&line.ip).await {
            return Err(DeployError::HostUnreachable(line.ip));
        }

        if line.node_count <= 0 {
            return Err(DeployError::node_count(
                line.node_count,
                format!("line {raw:?} must place at least one node"),
            ));
        }

        parsed.push(line);
    }

    if parsed.is_empty() {
        return Err(DeployError::EmptyTopology);
    }

    info!(lines = parsed.len(), hosts = host_agency.len(), "topology parsed");
    Ok(parsed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use rstest::rstest;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    fn groups(ids: &[i32]) -> BTreeSet<GroupId> {
        ids.iter().copied().map(GroupId::new).collect()
    }

    #[rstest]
    #[case("10.0.0.1:agencyA:2:{1}", "10.0.0.1", "agencyA", 2, &[1])]
    #[case("10.0.0.2:agencyA:1:{1,2}", "10.0.0.2", "agencyA", 1, &[1, 2])]
    #[case(" 10.0.0.3:agencyB:4:{ 3 , 1 } ", "10.0.0.3", "agencyB", 4, &[1, 3])]
    #[case("10.0.0.4:3 agencyC 1,2 30300,20200,8545", "10.0.0.4", "agencyC", 3, &[1, 2])]
    #[case("10.0.0.5:agencyA:0:{1}", "10.0.0.5", "agencyA", 0, &[1])]
    #[case("10.0.0.6:agencyA:1:{1, 2}", "10.0.0.6", "agencyA", 1, &[1, 2])]
    fn parses_both_forms(
        #[case] raw: &str,
        #[case] ip: &str,
        #[case] agency: &str,
        #[case] count: i64,
        #[case] group_ids: &[i32],
    ) {
        let line = ConfigLine::parse(raw).unwrap();
        assert_eq!(line.ip, ip);
        assert_eq!(line.agency_name, agency);
        assert_eq!(line.node_count, count);
        assert_eq!(line.group_ids, groups(group_ids));
    }

    #[rstest]
    #[case("# a comment")]
    #[case("10.0.0.1")]
    #[case("10.0.0.1:agencyA:2")]
    #[case("10.0.0.1:agencyA:two:{1}")]
    #[case("10.0.0.1:agencyA:2:{}")]
    #[case("300.0.0.1:agencyA:2:{1}")]
    #[case("10.0.0.1:agencyA:2:{0}")]
    #[case("10.0.0.1:agencyA:2:1,2}")]
    fn rejects_malformed(#[case] raw: &str) {
        assert!(ConfigLine::parse(raw).is_none());
    }

    #[test]
    fn canonical_display_round_trips() {
        let line = ConfigLine::parse("10.0.0.2:agencyA:1:{2,1}").unwrap();
        assert_eq!(line.to_string(), "10.0.0.2:agencyA:1:{1,2}");
        assert_eq!(ConfigLine::parse(&line.to_string()).unwrap(), line);
        assert_eq!(line.to_tool_line(), "10.0.0.2:1 agencyA 1,2");
    }

    #[tokio::test]
    async fn keeps_input_order_and_skips_comments() {
        let remote = MockRemote::new();
        let parsed = parse_topology(
            &lines(&["", "10.0.0.2:agencyA:1:{1,2}", "not a line", "10.0.0.1:agencyA:2:{1}"]),
            &remote,
        )
        .await
        .unwrap();

        let ips: Vec<_> = parsed.iter().map(|l| l.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn agency_match_is_case_insensitive() {
        let remote = MockRemote::new();
        let parsed = parse_topology(
            &lines(&["10.0.0.1:agencyA:1:{1}", "10.0.0.1:AGENCYA:1:{2}"]),
            &remote,
        )
        .await
        .unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn host_with_two_agencies_conflicts() {
        let remote = MockRemote::new();
        let err = parse_topology(
            &lines(&["10.0.0.1:agencyA:1:{1}", "10.0.0.1:agencyB:1:{1}"]),
            &remote,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeployError::HostAgencyConflict { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_fails() {
        let remote = MockRemote::new();
        remote.mark_unreachable("10.0.0.2");
        let err = parse_topology(
            &lines(&["10.0.0.1:agencyA:1:{1}", "10.0.0.2:agencyA:1:{1}"]),
            &remote,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeployError::HostUnreachable(ip) if ip == "10.0.0.2"));
    }

    #[rstest]
    #[case("10.0.0.1:agencyA:0:{1}", 0)]
    #[case("10.0.0.1:agencyA:-1:{1}", -1)]
    #[case("10.0.0.1:-2 agencyA 1", -2)]
    #[tokio::test]
    async fn non_positive_count_fails(#[case] raw: &str, #[case] expected: i64) {
        let remote = MockRemote::new();
        let err = parse_topology(&lines(&[raw]), &remote).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidNodeCount { count, .. } if count == expected));
    }

    #[rstest]
    #[case(&[])]
    #[case(&["", "   "])]
    #[case(&["garbage", "# comment"])]
    #[tokio::test]
    async fn empty_input_fails(#[case] raw: &[&str]) {
        let remote = MockRemote::new();
        let err = parse_topology(&lines(raw), &remote).await.unwrap_err();
        assert!(matches!(err, DeployError::EmptyTopology));
    }
}
