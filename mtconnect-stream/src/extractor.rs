//! MTConnect Streams signal extractor
//!
//! Walks one `current` document and flattens it into data items:
//!
//! ```text
//! MTConnectStreams
//! └─ Streams
//!    └─ DeviceStream (name)
//!       └─ ComponentStream (component, name)
//!          ├─ Samples   → items
//!          ├─ Events    → items
//!          └─ Condition → items
//! ```
//!
//! Traversal is in document order with the three sections in the fixed order
//! above. Downstream "first occurrence wins" rules depend on that order.

use crate::types::{
    Category, ExtractedSignal, Result, SignalIdentity, StreamError, UNKNOWN_COMPONENT,
    UNKNOWN_COMPONENT_TYPE, UNKNOWN_DEVICE,
};
use roxmltree::{Document, Node};

/// Namespace family advertised by every Streams schema version
pub const STREAMS_NAMESPACE_PREFIX: &str = "urn:mtconnect.org:MTConnectStreams";

/// Marker an agent writes when it has no value for an item
const UNAVAILABLE: &str = "UNAVAILABLE";

/// Everything pulled out of one document
#[derive(Debug, Default)]
pub struct Extraction {
    /// Namespace the document was read against
    pub namespace: Option<String>,
    /// `Header@creationTime`, if present
    pub creation_time: Option<String>,
    /// Non-absent data items in traversal order
    pub signals: Vec<ExtractedSignal>,
    /// Non-fatal problems found while reading (schema mismatches)
    pub warnings: Vec<StreamError>,
}

/// Which namespaces count as "the Streams namespace" for one document
///
/// Agents are inconsistent about prefixes, so an element is in scope if it
/// carries the expected namespace, the root's namespace, or none at all.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamScope<'a> {
    expected: Option<&'a str>,
    document: Option<&'a str>,
}

impl<'a> StreamScope<'a> {
    pub(crate) fn new(expected: Option<&'a str>, document: Option<&'a str>) -> Self {
        Self { expected, document }
    }

    /// The namespace reads are performed against
    pub(crate) fn effective(&self) -> Option<&'a str> {
        self.expected.or(self.document)
    }

    /// True if `node` is an element named `local` within this scope
    pub(crate) fn is(&self, node: &Node, local: &str) -> bool {
        node.is_element() && node.tag_name().name() == local && self.contains(node)
    }

    fn contains(&self, node: &Node) -> bool {
        match node.tag_name().namespace() {
            None => true,
            Some(ns) => Some(ns) == self.expected || Some(ns) == self.document,
        }
    }
}

/// Parse a document, mapping XML syntax errors onto the stream taxonomy
pub(crate) fn parse_document(document: &str) -> Result<Document<'_>> {
    Document::parse(document).map_err(|e| StreamError::MalformedDocument(e.to_string()))
}

/// Check the root namespace against the expected Streams namespace
///
/// Returns the mismatch as an error value; callers log it and continue.
pub(crate) fn check_schema(root: &Node, expected: Option<&str>) -> Option<StreamError> {
    let found = root.tag_name().namespace().unwrap_or_default();

    match expected {
        Some(expected) if expected != found => Some(StreamError::UnexpectedSchema {
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        None if !found.starts_with(STREAMS_NAMESPACE_PREFIX) => {
            Some(StreamError::UnexpectedSchema {
                expected: format!("{}:*", STREAMS_NAMESPACE_PREFIX),
                found: found.to_string(),
            })
        }
        _ => None,
    }
}

/// Read an element's value, treating empty text and `UNAVAILABLE` as absent
pub(crate) fn element_value(node: &Node) -> Option<String> {
    let text = node.text().map(str::trim).unwrap_or_default();
    if text.is_empty() || text.eq_ignore_ascii_case(UNAVAILABLE) {
        None
    } else {
        Some(text.to_string())
    }
}

/// Extract all available data items from one MTConnect Streams document
///
/// # Arguments
/// * `document` - XML text of one `current` response
/// * `namespace` - expected Streams namespace, or `None` to sniff it from the root tag
///
/// # Returns
/// * `Ok(Extraction)` - items in traversal order plus any schema warnings
/// * `Err(StreamError::MalformedDocument)` - the text is not XML
pub fn extract(document: &str, namespace: Option<&str>) -> Result<Extraction> {
    let doc = parse_document(document)?;
    let root = doc.root_element();

    let mut warnings = Vec::new();
    if let Some(warning) = check_schema(&root, namespace) {
        log::warn!("{} (continuing best-effort)", warning);
        warnings.push(warning);
    }

    let scope = StreamScope::new(namespace, root.tag_name().namespace());

    let creation_time = root
        .children()
        .find(|n| scope.is(n, "Header"))
        .and_then(|header| header.attribute("creationTime"))
        .map(str::to_string);

    let mut signals = Vec::new();
    for device in root.descendants().filter(|n| scope.is(n, "DeviceStream")) {
        let device_name = device.attribute("name").unwrap_or(UNKNOWN_DEVICE);

        for component in device.descendants().filter(|n| scope.is(n, "ComponentStream")) {
            let component_name = component.attribute("name").unwrap_or(UNKNOWN_COMPONENT);
            let component_type = component
                .attribute("component")
                .unwrap_or(UNKNOWN_COMPONENT_TYPE);

            for category in Category::ALL {
                let sections = component
                    .children()
                    .filter(|n| scope.is(n, category.element_name()));

                for section in sections {
                    for item in section.children().filter(|n| n.is_element()) {
                        let Some(value) = element_value(&item) else {
                            log::trace!(
                                "Skipping absent item {} in {}/{}",
                                item.tag_name().name(),
                                device_name,
                                component_name
                            );
                            continue;
                        };

                        let identity = SignalIdentity::new(
                            device_name,
                            component_name,
                            component_type,
                            internal_name(&item),
                        );

                        signals.push(ExtractedSignal {
                            identity,
                            category,
                            element_name: item.tag_name().name().to_string(),
                            value,
                            timestamp: item.attribute("timestamp").map(str::to_string),
                        });
                    }
                }
            }
        }
    }

    log::debug!("Extracted {} available items", signals.len());

    Ok(Extraction {
        namespace: scope.effective().map(str::to_string),
        creation_time,
        signals,
        warnings,
    })
}

/// Stable key of a data item: `name`, then `dataItemId`, then `type`, then the tag
fn internal_name(item: &Node) -> String {
    ["name", "dataItemId", "dataItemID", "type"]
        .iter()
        .find_map(|attr| item.attribute(*attr).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| item.tag_name().name())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "urn:mtconnect.org:MTConnectStreams:1.3";

    fn doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<MTConnectStreams xmlns="{NS}">
  <Header creationTime="2025-03-01T10:00:00Z" sender="agent" instanceId="1"/>
  <Streams>{body}</Streams>
</MTConnectStreams>"#
        )
    }

    #[test]
    fn test_traversal_order_and_identity() {
        let xml = doc(r#"
            <DeviceStream name="Mazak" uuid="M1">
              <ComponentStream component="Rotary" name="C" componentId="c1">
                <Events><RotaryMode dataItemId="c_mode">SPINDLE</RotaryMode></Events>
                <Samples><RotaryVelocity dataItemId="c_speed" name="Srpm">1200</RotaryVelocity></Samples>
              </ComponentStream>
              <ComponentStream component="Path" name="path">
                <Condition><Normal type="SYSTEM" dataItemId="path_system">OK</Normal></Condition>
                <Samples><PathFeedrate dataItemId="path_feed">  35.5  </PathFeedrate></Samples>
              </ComponentStream>
            </DeviceStream>"#);

        let extraction = extract(&xml, None).unwrap();
        let names: Vec<&str> = extraction
            .signals
            .iter()
            .map(|s| s.identity.internal_name.as_str())
            .collect();

        // Samples before Events inside a component, components in document order
        assert_eq!(names, vec!["Srpm", "c_mode", "path_feed", "path_system"]);
        assert_eq!(extraction.signals[0].identity.display_label, "Srpm (C - Mazak)");
        assert_eq!(extraction.signals[0].category, Category::Samples);
        assert_eq!(extraction.signals[2].value, "35.5");
        assert_eq!(extraction.signals[3].category, Category::Condition);
        assert_eq!(extraction.creation_time.as_deref(), Some("2025-03-01T10:00:00Z"));
        assert_eq!(extraction.namespace.as_deref(), Some(NS));
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn test_unavailable_and_empty_are_absent() {
        let xml = doc(r#"
            <DeviceStream name="Mazak">
              <ComponentStream component="Linear" name="X">
                <Samples>
                  <Position dataItemId="x1" name="Xpos">UNAVAILABLE</Position>
                  <Position dataItemId="x2" name="Xload">unavailable</Position>
                  <Position dataItemId="x3" name="Xcmd"></Position>
                  <Position dataItemId="x4" name="Xact">   </Position>
                  <Position dataItemId="x5" name="Xfrt">12.0</Position>
                </Samples>
              </ComponentStream>
            </DeviceStream>"#);

        let extraction = extract(&xml, None).unwrap();
        assert_eq!(extraction.signals.len(), 1);
        assert_eq!(extraction.signals[0].identity.internal_name, "Xfrt");
    }

    #[test]
    fn test_internal_name_fallbacks() {
        let xml = doc(r#"
            <DeviceStream>
              <ComponentStream>
                <Events>
                  <Availability dataItemId="avail">AVAILABLE</Availability>
                  <Execution type="EXECUTION">ACTIVE</Execution>
                  <EmergencyStop>ARMED</EmergencyStop>
                </Events>
              </ComponentStream>
            </DeviceStream>"#);

        let extraction = extract(&xml, None).unwrap();
        let ids: Vec<&SignalIdentity> = extraction.signals.iter().map(|s| &s.identity).collect();

        assert_eq!(ids[0].internal_name, "avail");
        assert_eq!(ids[1].internal_name, "EXECUTION");
        assert_eq!(ids[2].internal_name, "EmergencyStop");
        assert_eq!(ids[0].device_name, UNKNOWN_DEVICE);
        assert_eq!(ids[0].component_name, UNKNOWN_COMPONENT);
        assert_eq!(ids[0].component_type, UNKNOWN_COMPONENT_TYPE);
    }

    #[test]
    fn test_malformed_document() {
        let result = extract("<MTConnectStreams><Streams>", None);
        assert!(matches!(result, Err(StreamError::MalformedDocument(_))));
    }

    #[test]
    fn test_namespace_mismatch_is_warning() {
        let xml = doc(r#"
            <DeviceStream name="d"><ComponentStream name="c" component="Path">
              <Samples><PartCount name="parts">7</PartCount></Samples>
            </ComponentStream></DeviceStream>"#);

        let extraction = extract(&xml, Some("urn:mtconnect.org:MTConnectStreams:2.0")).unwrap();

        assert_eq!(extraction.warnings.len(), 1);
        assert!(matches!(extraction.warnings[0], StreamError::UnexpectedSchema { .. }));
        // Reading continues against the document's own namespace
        assert_eq!(extraction.signals.len(), 1);
    }

    #[test]
    fn test_unprefixed_document_warns_and_parses() {
        let xml = r#"<MTConnectStreams><Streams><DeviceStream name="d">
            <ComponentStream name="c" component="Path"><Events><Block name="blk">G01 X1</Block></Events>
            </ComponentStream></DeviceStream></Streams></MTConnectStreams>"#;

        let extraction = extract(xml, None).unwrap();
        assert_eq!(extraction.warnings.len(), 1);
        assert_eq!(extraction.signals[0].value, "G01 X1");
        assert!(extraction.creation_time.is_none());
    }

    #[test]
    fn test_foreign_namespace_elements_ignored() {
        let xml = format!(
            r#"<MTConnectStreams xmlns="{NS}" xmlns:x="urn:example:ext"><Streams>
            <DeviceStream name="d"><ComponentStream name="c" component="Path">
              <Samples><PartCount name="parts">7</PartCount></Samples>
              <x:Samples><PartCount name="ext_parts">9</PartCount></x:Samples>
            </ComponentStream></DeviceStream></Streams></MTConnectStreams>"#
        );

        let extraction = extract(&xml, None).unwrap();
        assert_eq!(extraction.signals.len(), 1);
        assert_eq!(extraction.signals[0].identity.internal_name, "parts");
    }
}
