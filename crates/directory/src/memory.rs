//! In-memory [`DirectoryConnection`] for tests of dependent crates.
//!
//! Holds a flat map of entries keyed by lower-cased DN. Parent/child
//! rules, renames, moves and `unicodePwd` handling follow what an Active
//! Directory server does for the operations this system uses. Individual
//! operations can be made to fail on demand.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use galilee_core::account_control::AccountControl;
use galilee_core::dn::{self, RdnKind};
use uuid::Uuid;

use crate::connection::DirectoryConnection;
use crate::entry::{DirectoryEntry, SearchDepth};
use crate::error::{rc, DirectoryError, DirectoryResult};
use crate::password::{decode_password, PASSWORD_ATTRIBUTE};

/// Result code returned when deleting an entry that still has children.
const NOT_ALLOWED_ON_NON_LEAF: u32 = 66;

/// An operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    Search,
    Add,
    /// Any modify (`None`) or a modify of one attribute.
    Modify(Option<String>),
    ModifyDn,
    Compare,
    Delete,
    Bind,
}

impl FailPoint {
    fn matches(&self, other: &FailPoint) -> bool {
        match (self, other) {
            (FailPoint::Modify(None), FailPoint::Modify(_)) => true,
            (FailPoint::Modify(Some(a)), FailPoint::Modify(Some(b))) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    dn: String,
    guid: Uuid,
    attrs: HashMap<String, Vec<String>>,
    password: Option<String>,
}

impl Node {
    fn values(&self, attr: &str) -> Option<&Vec<String>> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v)
    }

    fn set(&mut self, attr: &str, values: Vec<String>) {
        self.attrs.retain(|k, _| !k.eq_ignore_ascii_case(attr));
        if !values.is_empty() {
            self.attrs.insert(attr.to_string(), values);
        }
    }

    fn is_disabled(&self) -> bool {
        self.values("userAccountControl")
            .and_then(|v| v.first())
            .and_then(|v| v.parse::<i32>().ok())
            .is_some_and(|raw| AccountControl::from(raw).is_disabled())
    }

    fn to_entry(&self, attrs: &[&str]) -> DirectoryEntry {
        let wanted = |name: &str| attrs.is_empty() || attrs.iter().any(|a| a.eq_ignore_ascii_case(name));
        let mut entry = DirectoryEntry {
            dn: self.dn.clone(),
            ..Default::default()
        };
        for (k, v) in &self.attrs {
            if wanted(k) {
                entry.attrs.insert(k.clone(), v.clone());
            }
        }
        if wanted("objectGUID") {
            entry
                .bin_attrs
                .insert("objectGUID".to_string(), vec![self.guid.to_bytes_le().to_vec()]);
        }
        entry
    }
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Node>,
    failures: Vec<FailPoint>,
    offline: bool,
    closed: bool,
    operations: Vec<String>,
    writes: usize,
}

impl State {
    fn node(&self, dn: &str) -> DirectoryResult<&Node> {
        self.entries
            .get(&key(dn))
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))
    }

    fn node_mut(&mut self, dn: &str) -> DirectoryResult<&mut Node> {
        self.entries
            .get_mut(&key(dn))
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))
    }

    fn has_children(&self, dn: &str) -> bool {
        self.entries.keys().any(|k| dn::is_descendant(k, dn))
    }
}

fn key(dn: &str) -> String {
    dn.trim().to_ascii_lowercase()
}

/// A directory server held in memory.
pub struct MemoryDirectory {
    domain: String,
    state: Mutex<State>,
}

impl MemoryDirectory {
    /// A directory containing only `roots` (e.g. the base DN and the
    /// quarantine OU). Seeded UPNs use `account@domain`.
    pub fn new(domain: &str, roots: &[&str]) -> Self {
        let dir = Self {
            domain: domain.to_string(),
            state: Mutex::new(State::default()),
        };
        {
            let mut state = dir.lock();
            for root in roots {
                let node = Node {
                    dn: root.to_string(),
                    guid: Uuid::new_v4(),
                    attrs: HashMap::from([
                        ("objectClass".to_string(), vec!["top".to_string()]),
                        ("distinguishedName".to_string(), vec![root.to_string()]),
                    ]),
                    password: None,
                };
                state.entries.insert(key(root), node);
            }
        }
        dir
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Failure injection
    // -----------------------------------------------------------------------

    /// Make the matching operation fail with "unwilling to perform".
    pub fn fail(&self, point: FailPoint) {
        self.lock().failures.push(point);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every operation fails with a connectivity error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    // -----------------------------------------------------------------------
    // Inspection and seeding
    // -----------------------------------------------------------------------

    /// Mutating operations performed so far, e.g. `"modify_dn CN=a,DC=x"`.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.lock().entries.get(&key(dn)).map(|n| n.to_entry(&[]))
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.lock().entries.contains_key(&key(dn))
    }

    pub fn password_of(&self, dn: &str) -> Option<String> {
        self.lock()
            .entries
            .get(&key(dn))
            .and_then(|n| n.password.clone())
    }

    pub fn guid_of(&self, dn: &str) -> Option<Uuid> {
        self.lock().entries.get(&key(dn)).map(|n| n.guid)
    }

    /// Insert an org unit under `parent` without touching the counters.
    pub fn seed_org_unit(&self, parent: &str, name: &str) -> (String, Uuid) {
        let ou_dn = dn::child_dn(RdnKind::Ou, name, parent);
        let guid = Uuid::new_v4();
        let node = Node {
            dn: ou_dn.clone(),
            guid,
            attrs: HashMap::from([
                (
                    "objectClass".to_string(),
                    vec!["top".to_string(), "organizationalUnit".to_string()],
                ),
                ("name".to_string(), vec![name.to_string()]),
                ("distinguishedName".to_string(), vec![ou_dn.clone()]),
            ]),
            password: None,
        };
        self.lock().entries.insert(key(&ou_dn), node);
        (ou_dn, guid)
    }

    /// Insert an enabled user under `parent` without touching the counters.
    pub fn seed_user(&self, parent: &str, display_name: &str, account_name: &str, password: &str) -> String {
        let user_dn = dn::child_dn(RdnKind::Cn, display_name, parent);
        let upn = format!("{account_name}@{}", self.domain);
        let attrs = [
            ("objectClass", vec!["top", "person", "organizationalPerson", "user"]),
            ("name", vec![display_name]),
            ("displayName", vec![display_name]),
            ("sAMAccountName", vec![account_name]),
            ("userPrincipalName", vec![upn.as_str()]),
            ("userAccountControl", vec!["512"]),
            ("badPwdCount", vec!["0"]),
        ];
        let mut attrs: HashMap<String, Vec<String>> = attrs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
            .collect();
        attrs.insert("distinguishedName".to_string(), vec![user_dn.clone()]);
        let node = Node {
            dn: user_dn.clone(),
            guid: Uuid::new_v4(),
            attrs,
            password: Some(password.to_string()),
        };
        self.lock().entries.insert(key(&user_dn), node);
        user_dn
    }

    /// Gate every call: offline, closed, then injected failures.
    fn guard(&self, state: &State, point: FailPoint) -> DirectoryResult<()> {
        if state.offline {
            return Err(DirectoryError::Connectivity("server offline".to_string()));
        }
        if state.closed {
            return Err(DirectoryError::Connectivity("connection closed".to_string()));
        }
        if state.failures.iter().any(|f| f.matches(&point)) {
            return Err(DirectoryError::Rejected {
                code: rc::UNWILLING_TO_PERFORM,
                message: format!("injected {point:?} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnection for MemoryDirectory {
    async fn search(
        &self,
        base: &str,
        depth: SearchDepth,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let state = self.lock();
        self.guard(&state, FailPoint::Search)?;
        state.node(base)?;
        let filter = Filter::parse(filter).ok_or_else(|| DirectoryError::Rejected {
            code: 87,
            message: format!("bad search filter '{filter}'"),
        })?;

        let base_key = key(base);
        Ok(state
            .entries
            .iter()
            .filter(|(k, _)| match depth {
                SearchDepth::Base => **k == base_key,
                SearchDepth::Subtree => **k == base_key || dn::is_descendant(k, base),
            })
            .filter(|(_, node)| filter.matches(node))
            .map(|(_, node)| node.to_entry(attrs))
            .collect())
    }

    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attrs: &[(String, Vec<String>)],
    ) -> DirectoryResult<()> {
        let mut state = self.lock();
        self.guard(&state, FailPoint::Add)?;
        if state.entries.contains_key(&key(dn)) {
            return Err(DirectoryError::AlreadyExists(dn.to_string()));
        }
        let parent = dn::parent_of(dn).unwrap_or_default();
        state.node(parent)?;

        let mut node = Node {
            dn: dn.to_string(),
            guid: Uuid::new_v4(),
            attrs: HashMap::new(),
            password: None,
        };
        node.set(
            "objectClass",
            object_classes.iter().map(|c| c.to_string()).collect(),
        );
        for (attr, values) in attrs.iter().filter(|(_, v)| !v.is_empty()) {
            node.set(attr, values.clone());
        }
        node.set("name", dn::rdn_value(dn).into_iter().collect());
        node.set("distinguishedName", vec![dn.to_string()]);
        // New user accounts start disabled until a password is set.
        if object_classes.iter().any(|c| c.eq_ignore_ascii_case("user"))
            && node.values("userAccountControl").is_none()
        {
            node.set(
                "userAccountControl",
                vec![AccountControl::disabled().bits().to_string()],
            );
        }

        state.entries.insert(key(dn), node);
        state.operations.push(format!("add {dn}"));
        state.writes += 1;
        Ok(())
    }

    async fn modify_replace(
        &self,
        dn: &str,
        attr: &str,
        values: Vec<Vec<u8>>,
    ) -> DirectoryResult<()> {
        let mut state = self.lock();
        self.guard(&state, FailPoint::Modify(Some(attr.to_string())))?;
        let node = state.node_mut(dn)?;

        if attr.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE) {
            let password = values
                .first()
                .and_then(|v| decode_password(v))
                .ok_or_else(|| DirectoryError::Rejected {
                    code: rc::UNWILLING_TO_PERFORM,
                    message: "malformed unicodePwd value".to_string(),
                })?;
            node.password = Some(password);
        } else {
            node.set(
                attr,
                values
                    .into_iter()
                    .map(|v| String::from_utf8_lossy(&v).into_owned())
                    .collect(),
            );
        }

        state.operations.push(format!("modify {dn} {attr}"));
        state.writes += 1;
        Ok(())
    }

    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        let mut state = self.lock();
        self.guard(&state, FailPoint::ModifyDn)?;
        state.node(dn)?;

        let parent = match new_superior {
            Some(superior) => {
                state.node(superior)?;
                superior.to_string()
            }
            None => dn::parent_of(dn).unwrap_or_default().to_string(),
        };
        let new_dn = format!("{new_rdn},{parent}");
        if !dn::dn_eq(dn, &new_dn) && state.entries.contains_key(&key(&new_dn)) {
            return Err(DirectoryError::AlreadyExists(new_dn));
        }

        let old_key = key(dn);
        let moved: Vec<String> = state
            .entries
            .keys()
            .filter(|k| **k == old_key || dn::is_descendant(k, dn))
            .cloned()
            .collect();
        for k in moved {
            let Some(mut node) = state.entries.remove(&k) else {
                continue;
            };
            let prefix_len = node.dn.len() - dn.trim().len();
            node.dn = format!("{}{}", &node.dn[..prefix_len], new_dn);
            node.set("distinguishedName", vec![node.dn.clone()]);
            if k == old_key {
                node.set("name", dn::rdn_value(&new_dn).into_iter().collect());
            }
            state.entries.insert(key(&node.dn), node);
        }

        state.operations.push(format!("modify_dn {dn}"));
        state.writes += 1;
        Ok(())
    }

    async fn compare(&self, dn: &str, attr: &str, value: &str) -> DirectoryResult<bool> {
        let state = self.lock();
        self.guard(&state, FailPoint::Compare)?;
        let node = state.node(dn)?;
        Ok(node
            .values(attr)
            .is_some_and(|vals| vals.iter().any(|v| v.eq_ignore_ascii_case(value))))
    }

    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let mut state = self.lock();
        self.guard(&state, FailPoint::Delete)?;
        state.node(dn)?;
        if state.has_children(dn) {
            return Err(DirectoryError::Rejected {
                code: NOT_ALLOWED_ON_NON_LEAF,
                message: "entry has children".to_string(),
            });
        }
        state.entries.remove(&key(dn));
        state.operations.push(format!("delete {dn}"));
        state.writes += 1;
        Ok(())
    }

    async fn bind_check(&self, principal: &str, password: &str) -> DirectoryResult<bool> {
        let state = self.lock();
        if state.offline {
            return Err(DirectoryError::Connectivity("server offline".to_string()));
        }
        if state.failures.iter().any(|f| f.matches(&FailPoint::Bind)) {
            return Err(DirectoryError::Connectivity("injected bind failure".to_string()));
        }
        Ok(state.entries.values().any(|node| {
            node.values("userPrincipalName")
                .is_some_and(|upns| upns.iter().any(|u| u.eq_ignore_ascii_case(principal)))
                && node.password.as_deref() == Some(password)
                && !node.is_disabled()
        }))
    }

    async fn close(&self) -> DirectoryResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filter evaluation
// ---------------------------------------------------------------------------

/// The subset of RFC 4515 filters this system emits.
#[derive(Debug, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, Vec<u8>),
}

impl Filter {
    fn parse(input: &str) -> Option<Filter> {
        let (filter, rest) = Self::parse_one(input.trim())?;
        rest.trim().is_empty().then_some(filter)
    }

    fn parse_one(input: &str) -> Option<(Filter, &str)> {
        let body = input.strip_prefix('(')?;
        match body.chars().next()? {
            '&' | '|' => {
                let mut rest = &body[1..];
                let mut parts = Vec::new();
                while rest.starts_with('(') {
                    let (part, tail) = Self::parse_one(rest)?;
                    parts.push(part);
                    rest = tail;
                }
                let rest = rest.strip_prefix(')')?;
                let filter = if body.starts_with('&') {
                    Filter::And(parts)
                } else {
                    Filter::Or(parts)
                };
                Some((filter, rest))
            }
            '!' => {
                let (inner, rest) = Self::parse_one(&body[1..])?;
                Some((Filter::Not(Box::new(inner)), rest.strip_prefix(')')?))
            }
            _ => {
                let end = body.find(')')?;
                let (attr, value) = body[..end].split_once('=')?;
                let filter = if value == "*" {
                    Filter::Present(attr.to_string())
                } else {
                    Filter::Equal(attr.to_string(), unescape(value)?)
                };
                Some((filter, &body[end + 1..]))
            }
        }
    }

    fn matches(&self, node: &Node) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|p| p.matches(node)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(node)),
            Filter::Not(inner) => !inner.matches(node),
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass")
                    || attr.eq_ignore_ascii_case("objectGUID")
                    || node.values(attr).is_some()
            }
            Filter::Equal(attr, value) if attr.eq_ignore_ascii_case("objectGUID") => {
                node.guid.to_bytes_le().as_slice() == value.as_slice()
            }
            Filter::Equal(attr, value) => {
                let wanted = String::from_utf8_lossy(value);
                node.values(attr)
                    .is_some_and(|vals| vals.iter().any(|v| v.eq_ignore_ascii_case(&wanted)))
            }
        }
    }
}

/// Decode `\xx` escapes into raw bytes.
fn unescape(value: &str) -> Option<Vec<u8>> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}
