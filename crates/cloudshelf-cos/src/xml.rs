//! XML documents exchanged with COS
//!
//! Responses are parsed into a small element tree first; the typed
//! extractors below then walk the tree by local element name, so namespace
//! prefixes and element order do not matter.

use chrono::{DateTime, Utc};
use cloudshelf_core::domain::{ContentHash, Cursor, ObjectKey, Permission, Resource, Vendor};
use cloudshelf_core::ports::ListPage;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use crate::CosError;

// ============================================================================
// Element tree
// ============================================================================

/// One parsed XML element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    /// Concatenated character data of this element (entities resolved)
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First direct child named `name`
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children named `name`
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child named `name`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

/// Parse a whole document and return its root element
pub fn parse(document: &str) -> Result<XmlNode, CosError> {
    let mut reader = Reader::from_str(document);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    let local_name = |raw: &[u8]| {
        let name = String::from_utf8_lossy(raw).into_owned();
        match name.rsplit_once(':') {
            Some((_, local)) => local.to_string(),
            None => name,
        }
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(XmlNode {
                    name: local_name(e.name().as_ref()),
                    ..XmlNode::default()
                });
            }
            Ok(Event::Empty(ref e)) => {
                let node = XmlNode {
                    name: local_name(e.name().as_ref()),
                    ..XmlNode::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                let name = String::from_utf8_lossy(e.as_ref()).into_owned();
                let resolved = resolve_entity(&name)
                    .ok_or_else(|| CosError::InvalidResponse(format!("unknown entity &{name};")))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&resolved);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CosError::InvalidResponse("unbalanced XML".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CosError::InvalidResponse(format!(
                    "XML parse error at {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(CosError::InvalidResponse("truncated XML document".into()));
    }
    root.ok_or_else(|| CosError::InvalidResponse("empty XML document".into()))
}

/// Parse and check the root element name
fn parse_document(document: &str, expected_root: &str) -> Result<XmlNode, CosError> {
    let root = parse(document)?;
    if root.name != expected_root {
        return Err(CosError::InvalidResponse(format!(
            "expected <{expected_root}>, got <{}>",
            root.name
        )));
    }
    Ok(root)
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    text.trim().parse::<DateTime<Utc>>().ok()
}

// ============================================================================
// Error document
// ============================================================================

/// `<Error><Code/><Message/></Error>`; `None` when the body is not one
pub fn parse_error(document: &str) -> Option<(String, String)> {
    let root = parse(document).ok()?;
    if root.name != "Error" {
        return None;
    }
    Some((
        root.child_text("Code").unwrap_or_default().trim().to_string(),
        root.child_text("Message").unwrap_or_default().trim().to_string(),
    ))
}

// ============================================================================
// ListBucketResult
// ============================================================================

/// Convert a `GET Bucket` response into a [`ListPage`]
///
/// Keys the core cannot represent are skipped with a warning. When the
/// listing is truncated but COS omits `NextMarker` (no delimiter), the last
/// returned key continues the listing.
pub fn parse_list_result(document: &str, requested_marker: Option<&str>) -> Result<ListPage, CosError> {
    let root = parse_document(document, "ListBucketResult")?;
    let mut page = ListPage::default();
    let mut last_entry: Option<String> = None;

    for contents in root.children("Contents") {
        let raw_key = contents.child_text("Key").unwrap_or_default().to_string();
        last_entry = Some(raw_key.clone());
        let key = match ObjectKey::new(raw_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Skipping unrepresentable key in listing");
                continue;
            }
        };
        let size = contents
            .child_text("Size")
            .unwrap_or("0")
            .trim()
            .parse::<u64>()
            .map_err(|e| CosError::InvalidResponse(format!("bad Size for {key}: {e}")))?;

        let mut resource = Resource::object(key, size, Vendor::TencentCos);
        if let Some(modified) = contents.child_text("LastModified").and_then(parse_time) {
            resource = resource.with_modified(modified);
        }
        if let Some(hash) = contents
            .child_text("ETag")
            .and_then(|etag| ContentHash::new(etag.to_string()).ok())
        {
            resource = resource.with_hash(hash);
        }
        page.objects.push(resource);
    }

    for prefixes in root.children("CommonPrefixes") {
        if let Some(prefix) = prefixes.child_text("Prefix") {
            if !prefix.is_empty() {
                last_entry = Some(prefix.to_string());
                page.common_prefixes.push(prefix.to_string());
            }
        }
    }

    let truncated = root
        .child_text("IsTruncated")
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("true"));
    if truncated {
        let marker = root
            .child_text("NextMarker")
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or(last_entry)
            .ok_or_else(|| CosError::InvalidResponse("truncated listing without marker".into()))?;
        if requested_marker == Some(marker.as_str()) {
            return Err(CosError::InvalidResponse(format!(
                "listing did not advance past marker {marker}"
            )));
        }
        page.next_cursor = Some(
            Cursor::new(marker).map_err(|e| CosError::InvalidResponse(e.to_string()))?,
        );
    }

    Ok(page)
}

// ============================================================================
// AccessControlPolicy
// ============================================================================

const ALL_USERS_SUFFIX: &str = "/groups/global/AllUsers";

/// Public when the `AllUsers` group is granted `READ` or `FULL_CONTROL`
pub fn parse_acl(document: &str) -> Result<Permission, CosError> {
    let root = parse_document(document, "AccessControlPolicy")?;
    let public = root
        .children("AccessControlList")
        .flat_map(|list| list.children("Grant"))
        .any(|grant| {
            let to_everyone = grant
                .child("Grantee")
                .and_then(|g| g.child_text("URI"))
                .is_some_and(|uri| uri.trim().ends_with(ALL_USERS_SUFFIX));
            let readable = grant
                .child_text("Permission")
                .is_some_and(|p| matches!(p.trim(), "READ" | "FULL_CONTROL"));
            to_everyone && readable
        });
    Ok(if public {
        Permission::Public
    } else {
        Permission::Private
    })
}

// ============================================================================
// DomainConfiguration
// ============================================================================

/// Names of the enabled custom domains, in document order
pub fn parse_domains(document: &str) -> Result<Vec<String>, CosError> {
    let root = parse_document(document, "DomainConfiguration")?;
    Ok(root
        .children("DomainRule")
        .filter(|rule| {
            rule.child_text("Status")
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("ENABLED"))
        })
        .filter_map(|rule| rule.child_text("Name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

// ============================================================================
// Delete / DeleteResult
// ============================================================================

/// Body of a `POST /?delete` request
pub fn build_delete_request(keys: &[ObjectKey]) -> String {
    let mut body = String::from("<Delete><Quiet>false</Quiet>");
    for key in keys {
        body.push_str("<Object><Key>");
        body.push_str(&quick_xml::escape::escape(key.as_str()));
        body.push_str("</Key></Object>");
    }
    body.push_str("</Delete>");
    body
}

/// A key COS refused to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Keys deleted and keys refused by a batch delete
pub fn parse_delete_result(document: &str) -> Result<(Vec<String>, Vec<DeleteFailure>), CosError> {
    let root = parse_document(document, "DeleteResult")?;
    let deleted = root
        .children("Deleted")
        .filter_map(|d| d.child_text("Key"))
        .map(str::to_string)
        .collect();
    let failed = root
        .children("Error")
        .map(|e| DeleteFailure {
            key: e.child_text("Key").unwrap_or_default().to_string(),
            code: e.child_text("Code").unwrap_or_default().trim().to_string(),
            message: e.child_text("Message").unwrap_or_default().trim().to_string(),
        })
        .collect();
    Ok((deleted, failed))
}

// ============================================================================
// CopyObjectResult
// ============================================================================

/// ETag and modification time of a server-side copy
pub fn parse_copy_result(
    document: &str,
) -> Result<(Option<ContentHash>, Option<DateTime<Utc>>), CosError> {
    let root = parse(document)?;
    if root.name == "Error" {
        return Err(CosError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            code: root.child_text("Code").unwrap_or_default().to_string(),
            message: root.child_text("Message").unwrap_or_default().to_string(),
        });
    }
    if root.name != "CopyObjectResult" {
        return Err(CosError::InvalidResponse(format!(
            "expected <CopyObjectResult>, got <{}>",
            root.name
        )));
    }
    let hash = root
        .child_text("ETag")
        .and_then(|etag| ContentHash::new(etag.to_string()).ok());
    let modified = root.child_text("LastModified").and_then(parse_time);
    Ok((hash, modified))
}
