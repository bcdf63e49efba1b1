//! collection of template documents ([Node] tree and path to source file)
//!
//! [Documents] tracks
//! - the source path
//! - the root node of every loaded document
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
//!
//! Loading is the only place that touches the filesystem. Everything downstream reads the
//! [Node] tree and never mutates it, except through [crate::presentation::Schema::set].
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a [Node] came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub source: Option<Arc<PathBuf>>,
    /// Key path inside the document, e.g. `topology_template.node_templates.web`
    pub path: String,
}

impl Locator {
    pub fn new(source: Option<Arc<PathBuf>>, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    /// Locator of a child entry
    pub fn child(&self, key: impl std::fmt::Display) -> Self {
        let path = if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        };
        Self {
            source: self.source.clone(),
            path,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}", source.display())?,
            None => f.write_str("<literal>")?,
        }
        if !self.path.is_empty() {
            write!(f, " ({})", self.path)?;
        }
        Ok(())
    }
}

/// A document tree node: a scalar, an ordered sequence or an ordered mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub data: Data,
    pub locator: Option<Locator>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(IndexMap<String, Node>),
}

impl Node {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            locator: None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self.data, Data::Sequence(_) | Data::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Node>> {
        match &self.data {
            Data::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match &mut self.data {
            Data::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.data {
            Data::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    /// Child of a mapping node
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|mapping| mapping.get(key))
    }

    /// Short name of the node's shape, used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self.data {
            Data::Null => "null",
            Data::Boolean(_) => "boolean",
            Data::Integer(_) => "integer",
            Data::Float(_) => "float",
            Data::String(_) => "string",
            Data::Sequence(_) => "sequence",
            Data::Mapping(_) => "mapping",
        }
    }

    /// Converts a parsed yaml value, annotating every node with its key path
    pub fn from_yaml(value: serde_yaml::Value, locator: &Locator) -> Result<Self, LoadError> {
        use serde_yaml::Value as Y;

        let data = match value {
            Y::Null => Data::Null,
            Y::Bool(b) => Data::Boolean(b),
            Y::Number(n) => match n.as_i64() {
                Some(int) => Data::Integer(int),
                None => Data::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Y::String(s) => Data::String(s),
            Y::Sequence(sequence) => Data::Sequence(
                sequence
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| Node::from_yaml(item, &locator.child(index)))
                    .collect::<Result<_, _>>()?,
            ),
            Y::Mapping(mapping) => {
                let mut children = IndexMap::with_capacity(mapping.len());
                for (key, item) in mapping {
                    let key = match key {
                        Y::String(s) => s,
                        Y::Bool(b) => b.to_string(),
                        Y::Number(n) => n.to_string(),
                        other => {
                            return Err(LoadError::UnsupportedKey {
                                locator: locator.clone(),
                                key: format!("{other:?}"),
                            })
                        }
                    };
                    let child = Node::from_yaml(item, &locator.child(&key))?;
                    children.insert(key, child);
                }
                Data::Mapping(children)
            }
            Y::Tagged(tagged) => return Node::from_yaml(tagged.value, locator),
        };

        Ok(Self {
            data,
            locator: Some(locator.clone()),
        })
    }
}

impl From<Data> for Node {
    fn from(value: Data) -> Self {
        Node::new(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::new(Data::String(value.to_string()))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::new(Data::Integer(value))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::new(Data::Boolean(value))
    }
}

#[derive(Default, Debug)]
pub struct Documents {
    sources: Vec<Source>,
    roots: Vec<(usize, Node)>,
}

impl Documents {
    /// Inserts and indexes a document
    pub fn insert(&mut self, document: Node, path: impl Into<Option<PathBuf>>) {
        let source_index = self.sources.len();
        self.sources.push(path.into().map(Arc::new));
        self.roots.push((source_index, document));
    }

    /// Parses yaml text and inserts it
    pub fn insert_str(&mut self, text: &str, path: impl Into<Option<PathBuf>>) -> Result<(), LoadError> {
        let path = path.into().map(Arc::new);
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        let root = Node::from_yaml(value, &Locator::new(path.clone(), ""))?;

        self.sources.push(path);
        self.roots.push((self.sources.len() - 1, root));
        Ok(())
    }

    pub fn get_document(&self, index: usize) -> SourceDocument {
        let (source_index, root) = &self.roots[index];
        (index, &self.sources[*source_index], root)
    }

    pub fn documents(&self) -> impl Iterator<Item = SourceDocument> {
        self.roots
            .iter()
            .enumerate()
            .map(|(index, (source_index, root))| (index, &self.sources[*source_index], root))
    }

    pub fn document_count(&self) -> usize {
        self.roots.len()
    }

    /// Mutable access to a root, for transactional field writes
    pub fn root_mut(&mut self, index: usize) -> &mut Node {
        &mut self.roots[index].1
    }

    fn is_loaded(&self, path: &Path) -> bool {
        self.sources
            .iter()
            .flatten()
            .any(|source| source.as_path() == path)
    }
}

impl Documents {
    /// Loads a file and, recursively, everything listed in its `imports`
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let mut stack = vec![];
        self.load_file_inner(file_path, &mut stack)
    }

    fn load_file_inner(&mut self, file_path: &Path, stack: &mut Vec<PathBuf>) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        if stack.contains(&file_path) {
            return Err(LoadError::ImportCycle(file_path));
        }
        if self.is_loaded(&file_path) {
            tracing::debug!(path=%file_path.display(), "already loaded");
            return Ok(());
        }
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        self.insert_str(&file_contents, Some(file_path.clone()))?;

        let imports = imports_of(&self.roots[self.roots.len() - 1].1);
        let base = file_path.parent().map(Path::to_path_buf).unwrap_or_default();

        stack.push(file_path);
        for import in imports {
            self.load_file_inner(&base.join(import), stack)?;
        }
        stack.pop();

        Ok(())
    }

    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut any_files_loaded = false;

        let mut entries = std::fs::read_dir(dir_path)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        for dir_entry in entries {
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let file_name = dir_entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_yaml_file = file_name.ends_with(".yaml") || file_name.ends_with(".yml");
            if !is_yaml_file {
                continue;
            }

            self.load_file(&dir_entry.path())?;
            any_files_loaded = true;
        }

        if !any_files_loaded {
            return Err(LoadError::NoFilesFound);
        }

        Ok(())
    }
}

/// Import entries of a document root: plain strings or `{file: ...}` mappings
fn imports_of(root: &Node) -> Vec<String> {
    let Some(imports) = root.get("imports").and_then(Node::as_sequence) else {
        return vec![];
    };

    imports
        .iter()
        .filter_map(|import| match &import.data {
            Data::String(s) => Some(s.clone()),
            Data::Mapping(_) => import.get("file").and_then(Node::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No files found in directory")]
    NoFilesFound,
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml file")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unsupported mapping key {key} at {locator}")]
    UnsupportedKey { locator: Locator, key: String },
    #[error("Import cycle through {}", .0.display())]
    ImportCycle(PathBuf),
}

/// Utility macro to create [Documents]
///
/// Create from a single document
/// ```
/// # use orca::documents;
/// documents!("tosca_definitions_version: tosca_simple_yaml_1_3");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use orca::documents;
/// documents! {
///   "types.yaml" => "node_types: {}",
///   "topology.yaml" => "topology_template: {}"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use orca::documents;
/// documents!("key: [unterminated");
/// ```
#[macro_export]
macro_rules! documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::document::Documents::default();
        docs.insert_str($expr, None).expect("document must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::document::Documents::default();
        $(
            docs.insert_str($expr, Some(std::path::PathBuf::from($source))).expect("document must parse");
        )+

        docs
    }};
}

pub type Source = Option<Arc<PathBuf>>;
pub type SourceDocument<'a> = (usize, &'a Source, &'a Node);
