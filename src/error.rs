use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocError>;

#[derive(Error, Debug)]
pub enum LocError {
    #[error("Git error: {0}")]
    Git(#[from] Box<gix::open::Error>),
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Config syntax error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Malformed commit {commit_id}: {reason}")]
    MalformedCommit { commit_id: String, reason: String },
    #[error("Counters overflow when adding commit {commit_id}")]
    CounterOverflow { commit_id: String },
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
    #[error("Object lookup error: {0}")]
    ObjectTryFind(#[from] Box<gix::object::find::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Diff tree to tree error: {0}")]
    DiffTreeToTree(#[from] Box<gix::repository::diff_tree_to_tree::Error>),
    #[error("Git discover error: {0}")]
    GitDiscover(#[from] Box<gix::discover::Error>),
}

impl LocError {
    pub fn malformed(commit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        LocError::MalformedCommit {
            commit_id: commit_id.into(),
            reason: reason.into(),
        }
    }

    /// Per-commit problems that a scan records and steps over. Everything else
    /// ends the operation that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LocError::MalformedCommit { .. })
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::open::Error> for LocError {
    fn from(err: gix::open::Error) -> Self {
        LocError::Git(Box::new(err))
    }
}

impl From<gix::object::find::existing::Error> for LocError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        LocError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::find::Error> for LocError {
    fn from(err: gix::object::find::Error) -> Self {
        LocError::ObjectTryFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for LocError {
    fn from(err: gix::object::commit::Error) -> Self {
        LocError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for LocError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        LocError::RefFind(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for LocError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        LocError::HeadPeel(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for LocError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        LocError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for LocError {
    fn from(err: gix::objs::decode::Error) -> Self {
        LocError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::repository::diff_tree_to_tree::Error> for LocError {
    fn from(err: gix::repository::diff_tree_to_tree::Error) -> Self {
        LocError::DiffTreeToTree(Box::new(err))
    }
}

impl From<gix::discover::Error> for LocError {
    fn from(err: gix::discover::Error) -> Self {
        LocError::GitDiscover(Box::new(err))
    }
}
