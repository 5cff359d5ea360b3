pub(crate) mod modal;
pub(crate) mod path_table;
pub(crate) mod text;
