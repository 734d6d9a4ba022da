//! Host and gateway topology
//!
//! A host list is a line-oriented file:
//!
//! ```text
//! # web tier, reachable directly
//! web1.example.com
//! deploy@web2.example.com:2222
//!
//! gateway jump.example.com
//!     db1.internal
//!     gateway admin@jump2.internal
//!         vault.internal
//!     end
//! end
//! ```
//!
//! `#` starts a comment that runs to the end of the line. `gateway <spec>`
//! opens a block whose hosts are reached through that gateway, `end` closes
//! it. Every other non-blank line is a host specification.

use std::path::Path;

use crate::error::ParseError;
use crate::types::{HostDefaults, HostSpec};

/// A node of the host tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyNode {
    /// A host to run the action on
    Host(HostSpec),
    /// A jump host; its children are reached through it
    Gateway {
        spec: HostSpec,
        children: Vec<TopologyNode>,
    },
}

impl TopologyNode {
    /// Number of hosts in this subtree
    pub fn host_count(&self) -> usize {
        match self {
            TopologyNode::Host(_) => 1,
            TopologyNode::Gateway { children, .. } => children.iter().map(Self::host_count).sum(),
        }
    }
}

/// Parsed host list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<TopologyNode>,
}

impl Topology {
    /// Topology with a single directly reachable host
    pub fn single(host: HostSpec) -> Self {
        Self {
            nodes: vec![TopologyNode::Host(host)],
        }
    }

    /// Parse host-list text
    pub fn parse(text: &str, defaults: &HostDefaults) -> Result<Self, ParseError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, strip_comment(line).trim()))
            .filter(|(_, line)| !line.is_empty());

        let nodes = parse_block(&mut lines, defaults, None)?;
        Ok(Self { nodes })
    }

    /// Read and parse a host-list file
    pub fn load(path: &Path, defaults: &HostDefaults) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded host list from {:?}", path);
        Self::parse(&text, defaults)
    }

    /// Put the whole topology behind one more gateway
    pub fn behind(self, gateway: HostSpec) -> Self {
        Self {
            nodes: vec![TopologyNode::Gateway {
                spec: gateway,
                children: self.nodes,
            }],
        }
    }

    /// Top-level nodes in file order
    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    /// Total number of hosts
    pub fn host_count(&self) -> usize {
        self.nodes.iter().map(TopologyNode::host_count).sum()
    }

    /// Whether there is nothing to visit
    pub fn is_empty(&self) -> bool {
        self.host_count() == 0
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Parse nodes until the matching `end`, or end of input
///
/// `open` is the gateway and line number of the enclosing block, `None` at
/// top level.
fn parse_block<'a, I>(
    lines: &mut I,
    defaults: &HostDefaults,
    open: Option<(&HostSpec, usize)>,
) -> Result<Vec<TopologyNode>, ParseError>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let mut nodes = Vec::new();

    while let Some((line_no, line)) = lines.next() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("end") => {
                if words.next().is_some() {
                    return Err(syntax(line_no, "`end` takes no arguments"));
                }
                if open.is_none() {
                    return Err(syntax(line_no, "`end` without matching `gateway`"));
                }
                return Ok(nodes);
            }
            Some("gateway") => {
                let args: Vec<&str> = words.collect();
                let [target] = args.as_slice() else {
                    return Err(syntax(
                        line_no,
                        &format!("`gateway` expects exactly one host, got {}", args.len()),
                    ));
                };
                let spec = parse_spec(target, defaults, line_no)?;
                let children = parse_block(lines, defaults, Some((&spec, line_no)))?;
                nodes.push(TopologyNode::Gateway { spec, children });
            }
            Some(_) => {
                if line.split_whitespace().count() > 1 {
                    return Err(syntax(line_no, &format!("expected one host per line: {:?}", line)));
                }
                nodes.push(TopologyNode::Host(parse_spec(line, defaults, line_no)?));
            }
            None => {}
        }
    }

    if let Some((gateway, line_no)) = open {
        tracing::warn!(
            "gateway {} opened on line {} has no matching `end`, closing it at end of file",
            gateway,
            line_no
        );
    }
    Ok(nodes)
}

fn parse_spec(raw: &str, defaults: &HostDefaults, line: usize) -> Result<HostSpec, ParseError> {
    HostSpec::parse_with(raw, defaults).map_err(|e| syntax(line, &e.to_string()))
}

fn syntax(line: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.to_string(),
    }
}
