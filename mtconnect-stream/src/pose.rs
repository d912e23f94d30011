//! Robot pose reader
//!
//! Reads a six-axis arm's pose out of one `current` document: joint angles
//! `j1`..`j6` published as `Angle` items, plus `PathPosition` and
//! `Orientation` published as space-separated triples.

use crate::extractor::{check_schema, element_value, parse_document, StreamScope};
use crate::source::DocumentSource;
use crate::types::Result;
use chrono::{SecondsFormat, Utc};
use roxmltree::Node;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Joint names read from `Angle` items
pub const JOINT_NAMES: [&str; 6] = ["j1", "j2", "j3", "j4", "j5", "j6"];

/// One pose reading; parts the agent did not report are `None`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseSample {
    pub timestamp: String,
    pub joint_angles: BTreeMap<String, Option<f64>>,
    pub position: [Option<f64>; 3],
    pub orientation: [Option<f64>; 3],
}

impl PoseSample {
    /// True if all joints and both triples were read
    pub fn is_complete(&self) -> bool {
        self.joint_angles.values().all(Option::is_some)
            && self.position.iter().all(Option::is_some)
            && self.orientation.iter().all(Option::is_some)
    }
}

/// Read a pose from document text
pub fn read_pose(document: &str, namespace: Option<&str>) -> Result<PoseSample> {
    let doc = parse_document(document)?;
    let root = doc.root_element();
    if let Some(warning) = check_schema(&root, namespace) {
        log::warn!("{} (continuing best-effort)", warning);
    }
    let scope = StreamScope::new(namespace, root.tag_name().namespace());

    let find = |local: &str, name: Option<&str>| find_item(root, &scope, local, name);

    let joint_angles = JOINT_NAMES
        .iter()
        .map(|joint| {
            let angle = find("Angle", Some(*joint))
                .and_then(|n| element_value(&n))
                .and_then(|v| v.parse::<f64>().ok());
            (joint.to_string(), angle)
        })
        .collect();

    let position = find("PathPosition", None)
        .and_then(|n| element_value(&n))
        .map(|v| parse_triple(&v))
        .unwrap_or_default();

    let orientation = find("Orientation", None)
        .and_then(|n| element_value(&n))
        .map(|v| parse_triple(&v))
        .unwrap_or_default();

    let timestamp = root
        .children()
        .find(|n| scope.is(n, "Header"))
        .and_then(|h| h.attribute("creationTime"))
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

    Ok(PoseSample {
        timestamp,
        joint_angles,
        position,
        orientation,
    })
}

/// First in-scope element named `local`, optionally with a matching `name` attribute
fn find_item<'a, 'input>(
    root: Node<'a, 'input>,
    scope: &StreamScope,
    local: &str,
    name: Option<&str>,
) -> Option<Node<'a, 'input>> {
    root.descendants().find(|n| {
        scope.is(n, local) && name.map_or(true, |name| n.attribute("name") == Some(name))
    })
}

/// Fetch the current document and read the pose from it
pub fn sample_pose(
    source: &dyn DocumentSource,
    agent_url: &str,
    namespace: Option<&str>,
) -> Result<PoseSample> {
    let document = source.fetch(agent_url)?;
    read_pose(&document, namespace)
}

/// Parse `"x y z"`; a triple that is not exactly three numbers yields all `None`
fn parse_triple(text: &str) -> [Option<f64>; 3] {
    let parts: Vec<f64> = match text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(parts) => parts,
        Err(_) => return [None; 3],
    };

    match parts.as_slice() {
        [x, y, z] => [Some(*x), Some(*y), Some(*z)],
        _ => [None; 3],
    }
}

/// Accumulated pose samples, written out as JSON
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PoseLog {
    samples: Vec<PoseSample>,
}

impl PoseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: PoseSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| crate::types::StreamError::Export(e.to_string()))
    }

    /// Write the log to `path`, replacing it
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;
        log::info!("Saved {} pose samples to {:?}", self.samples.len(), path);
        Ok(())
    }
}
