mod collection;
mod notices;

pub use collection::CollectionView;
pub use notices::NoticeBoard;

use crate::entity::{KnowledgeEntry, RadarAnalysis, Task};

pub type TaskList = CollectionView<Task>;
pub type KnowledgeList = CollectionView<KnowledgeEntry>;
pub type RadarList = CollectionView<RadarAnalysis>;
