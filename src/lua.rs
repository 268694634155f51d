pub mod runtime;
pub mod sandbox;
pub mod template;

pub use runtime::LuaLoader;
pub use template::LuaTemplate;
