use miner_types::{Keyword, KeywordMap};
use serde::{Deserialize, Serialize};

/// `Group = Name ... End_Group`: a named list of keywords.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PvlGroup {
    pub name: String,
    pub keywords: Vec<Keyword>,
}

/// `Object = Name ... End_Object`: keywords, groups and nested objects.
///
/// The parsed document itself is returned as an object named `Root`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PvlObject {
    pub name: String,
    pub keywords: Vec<Keyword>,
    pub groups: Vec<PvlGroup>,
    pub objects: Vec<PvlObject>,
}

fn find_keyword<'a>(keywords: &'a [Keyword], name: &str) -> Option<&'a Keyword> {
    keywords.iter().find(|k| k.name.eq_ignore_ascii_case(name))
}

fn set_keyword(keywords: &mut Vec<Keyword>, keyword: Keyword) {
    match keywords
        .iter_mut()
        .find(|k| k.name.eq_ignore_ascii_case(&keyword.name))
    {
        Some(existing) => *existing = keyword,
        None => keywords.push(keyword),
    }
}

impl PvlGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        find_keyword(&self.keywords, name)
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword(name).is_some()
    }

    pub fn add_keyword(&mut self, keyword: Keyword) {
        set_keyword(&mut self.keywords, keyword);
    }

    pub fn to_map(&self) -> KeywordMap {
        self.keywords.iter().cloned().collect()
    }
}

impl PvlObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        find_keyword(&self.keywords, name)
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword(name).is_some()
    }

    /// First value of a keyword of this object.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.keyword(name).and_then(Keyword::first)
    }

    /// Set a keyword, replacing one of the same name.
    pub fn add_keyword(&mut self, keyword: Keyword) {
        set_keyword(&mut self.keywords, keyword);
    }

    pub fn group(&self, name: &str) -> Option<&PvlGroup> {
        self.groups.iter().find(|g| g.is_named(name))
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group(name).is_some()
    }

    pub fn object(&self, name: &str) -> Option<&PvlObject> {
        self.objects.iter().find(|o| o.is_named(name))
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.object(name).is_some()
    }

    /// Every direct child object with the given name, in file order.
    pub fn objects_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PvlObject> {
        self.objects.iter().filter(move |o| o.is_named(name))
    }

    /// Keywords of this object and of its groups, flattened into one map.
    /// Nested objects are not included; later definitions win.
    pub fn definition_map(&self) -> KeywordMap {
        let mut map: KeywordMap = self.keywords.iter().cloned().collect();
        for group in &self.groups {
            for keyword in &group.keywords {
                map.add_keyword(keyword.clone());
            }
        }
        map
    }
}
