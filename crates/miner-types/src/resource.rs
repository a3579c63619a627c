//! Resources: named keyword bags with geometry, assets and a discard flag.
//!
//! Attribute storage lives behind a shared handle so that `copy()` yields a
//! second view of the same data, while the active/discarded flag belongs to
//! each `Resource` value. Record sets are plain vectors of `Rc<Resource>`, so
//! membership changes never leak between sets that alias the same records.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::json;

use crate::geometry::SharedGeometry;
use crate::keyword::{Keyword, KeywordMap};
use crate::{MinerError, Result};

/// A resource shared between record sets.
pub type SharedResource = Rc<Resource>;

/// An ordered record set.
pub type ResourceList = Vec<SharedResource>;

/// Payload attached to a resource under a name.
#[derive(Debug, Clone)]
pub enum Asset {
    /// A nested record set (overlap composites, sidebar snapshots, ...).
    Resources(ResourceList),
    /// Any other structured value.
    Value(serde_json::Value),
}

impl Asset {
    pub fn as_resources(&self) -> Option<&ResourceList> {
        match self {
            Asset::Resources(list) => Some(list),
            Asset::Value(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ResourceData {
    name: String,
    keys: KeywordMap,
    geometry: Option<SharedGeometry>,
    /// Keyed by lowercase asset name.
    assets: BTreeMap<String, Asset>,
}

/// A named, mutable record.
#[derive(Debug)]
pub struct Resource {
    data: Rc<RefCell<ResourceData>>,
    discarded: Cell<bool>,
}

impl Resource {
    /// Create an active resource. The name is mirrored into `Identity`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_keys(name, KeywordMap::new())
    }

    /// Create an active resource from existing keywords.
    pub fn with_keys(name: impl Into<String>, keys: KeywordMap) -> Self {
        let name = name.into();
        let mut keys = keys;
        keys.add("Identity", name.clone());
        Self {
            data: Rc::new(RefCell::new(ResourceData {
                name,
                keys,
                geometry: None,
                assets: BTreeMap::new(),
            })),
            discarded: Cell::new(false),
        }
    }

    /// Convenience constructor returning a shared handle.
    pub fn shared(name: impl Into<String>) -> SharedResource {
        Rc::new(Self::new(name))
    }

    pub fn name(&self) -> String {
        self.data.borrow().name.clone()
    }

    /// Rename the resource, updating `Identity` to match.
    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        let mut data = self.data.borrow_mut();
        data.keys.add("Identity", name.clone());
        data.name = name;
    }

    /// Equality by name only, ignoring case.
    pub fn is_equal(&self, other: &Resource) -> bool {
        self.name().eq_ignore_ascii_case(&other.name())
    }

    /// True if both handles view the same attribute storage.
    pub fn shares_data_with(&self, other: &Resource) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    // ------------------------------------------------------------------
    // Keywords
    // ------------------------------------------------------------------

    pub fn exists(&self, key: &str) -> bool {
        self.data.borrow().keys.exists(key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.data.borrow().keys.count(key)
    }

    /// Value of `key` at `index`; `NotFound` if either is absent.
    pub fn value(&self, key: &str, index: usize) -> Result<String> {
        self.data.borrow().keys.get(key, index).map_err(|err| match err {
            MinerError::NotFound(msg) => {
                MinerError::NotFound(format!("{msg} in resource {}", self.name()))
            }
            other => other,
        })
    }

    pub fn value_or(&self, key: &str, default: &str) -> String {
        self.data.borrow().keys.value_or(key, default)
    }

    pub fn get_or(&self, key: &str, default: &str, index: usize) -> String {
        self.data.borrow().keys.get_or(key, default, index)
    }

    pub fn all_values(&self, key: &str) -> Vec<String> {
        self.data.borrow().keys.all_values(key)
    }

    pub fn is_null(&self, key: &str, index: usize) -> bool {
        self.data.borrow().keys.is_null(key, index)
    }

    pub fn keyword(&self, key: &str) -> Option<Keyword> {
        self.data.borrow().keys.keyword(key).cloned()
    }

    /// Snapshot of every keyword.
    pub fn keys(&self) -> KeywordMap {
        self.data.borrow().keys.clone()
    }

    /// Borrow the keyword storage without cloning it.
    pub fn keys_ref(&self) -> Ref<'_, KeywordMap> {
        Ref::map(self.data.borrow(), |d| &d.keys)
    }

    /// Set `key`, replacing existing values.
    pub fn add(&self, key: &str, value: impl Into<String>) {
        self.data.borrow_mut().keys.add(key, value);
    }

    pub fn add_keyword(&self, keyword: Keyword) {
        self.data.borrow_mut().keys.add_keyword(keyword);
    }

    /// Add one more value to `key`.
    pub fn append(&self, key: &str, value: impl Into<String>) {
        self.data.borrow_mut().keys.append(key, value);
    }

    pub fn erase(&self, key: &str) -> usize {
        self.data.borrow_mut().keys.erase(key)
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    pub fn set_geometry(&self, geometry: Option<SharedGeometry>) {
        self.data.borrow_mut().geometry = geometry;
    }

    pub fn geometry(&self) -> Option<SharedGeometry> {
        self.data.borrow().geometry.clone()
    }

    pub fn has_geometry(&self) -> bool {
        self.data.borrow().geometry.is_some()
    }

    pub fn has_valid_geometry(&self) -> bool {
        self.data
            .borrow()
            .geometry
            .as_ref()
            .is_some_and(|g| g.is_valid())
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn activate(&self) {
        self.discarded.set(false);
    }

    pub fn discard(&self) {
        self.discarded.set(true);
    }

    pub fn set_discarded(&self, discarded: bool) {
        self.discarded.set(discarded);
    }

    pub fn is_active(&self) -> bool {
        !self.discarded.get()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.get()
    }

    // ------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------

    /// Attach (or replace) a named asset.
    pub fn add_asset(&self, name: &str, asset: Asset) {
        self.data
            .borrow_mut()
            .assets
            .insert(name.to_ascii_lowercase(), asset);
    }

    pub fn has_asset(&self, name: &str) -> bool {
        self.data
            .borrow()
            .assets
            .contains_key(&name.to_ascii_lowercase())
    }

    pub fn asset(&self, name: &str) -> Result<Asset> {
        self.data
            .borrow()
            .assets
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                MinerError::NotFound(format!(
                    "asset \"{name}\" does not exist in resource {}",
                    self.name()
                ))
            })
    }

    /// A record-set asset; `NotFound` if absent or of another kind.
    pub fn asset_list(&self, name: &str) -> Result<ResourceList> {
        match self.asset(name)? {
            Asset::Resources(list) => Ok(list),
            Asset::Value(_) => Err(MinerError::NotFound(format!(
                "asset \"{name}\" in resource {} is not a resource list",
                self.name()
            ))),
        }
    }

    pub fn remove_asset(&self, name: &str) -> usize {
        usize::from(
            self.data
                .borrow_mut()
                .assets
                .remove(&name.to_ascii_lowercase())
                .is_some(),
        )
    }

    pub fn clear_assets(&self) -> usize {
        let mut data = self.data.borrow_mut();
        let n = data.assets.len();
        data.assets.clear();
        n
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.data.borrow().assets.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Copies
    // ------------------------------------------------------------------

    /// A new handle over the same attribute storage. The copy starts with
    /// this resource's status and tracks it independently afterwards.
    pub fn copy(&self) -> SharedResource {
        Rc::new(Resource {
            data: Rc::clone(&self.data),
            discarded: Cell::new(self.discarded.get()),
        })
    }

    /// A fully independent, active resource named `name`. Assets are kept
    /// only when `with_assets` is set.
    pub fn deep_clone(&self, name: &str, with_assets: bool) -> SharedResource {
        let mut data = self.data.borrow().clone();
        data.name = name.to_string();
        data.keys.add("Identity", name);
        if !with_assets {
            data.assets.clear();
        }
        Rc::new(Resource {
            data: Rc::new(RefCell::new(data)),
            discarded: Cell::new(false),
        })
    }

    /// JSON view of the resource for reporting.
    pub fn to_json(&self) -> serde_json::Value {
        let data = self.data.borrow();
        let keys: serde_json::Map<String, serde_json::Value> = data
            .keys
            .iter()
            .map(|k| {
                let value = if k.values.len() == 1 {
                    json!(k.values[0])
                } else {
                    json!(k.values)
                };
                (k.name.clone(), value)
            })
            .collect();
        json!({
            "name": data.name,
            "discarded": self.discarded.get(),
            "keywords": keys,
            "geometry": data.geometry.as_ref().map(|g| g.to_wkt()),
            "assets": data.assets.keys().collect::<Vec<_>>(),
        })
    }
}
