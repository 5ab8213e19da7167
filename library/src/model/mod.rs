pub mod param;
pub mod tree;

pub use param::{Access, ParamFactory, ParamKind, ParamSpec, Side};
pub use tree::{DataTree, Goo, TreePath};
