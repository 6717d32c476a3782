pub mod colortable;
pub mod cursor;
pub mod deform;
pub mod error;
pub mod mesh;
pub mod model;
pub mod pbd;
pub mod race;
pub mod vertex;
