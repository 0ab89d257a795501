//! Virtual module loader.
//!
//! Resolves `require` targets, in order:
//!
//! 1. Builtin virtual modules (`rover`, `readline`) registered per run.
//! 2. The exports cache — every module executes exactly once per run.
//! 3. The provided file map (`"./x"`, `"x"`, `"x.lua"` all resolve to the
//!    same entry; the `.lua` extension is appended when omitted). The file
//!    runs inside its own capability environment; its return value is the
//!    *live* exports value cached for subsequent requires.
//! 4. Third-party packages pre-fetched before the entry script ran.
//!
//! Anything else raises `module not found` as a normal script-level error.

use crate::context::RunContext;
use crate::error::to_lua_err;
use indexmap::IndexMap;
use mlua::Value;
use rover_core::SimError;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Builtin virtual module names.
pub const BUILTINS: [&str; 2] = ["rover", "readline"];

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Normalizes a file specifier: strips a leading `./`, appends `.lua` when
/// the extension is omitted.
#[must_use]
pub fn normalize_file_name(name: &str) -> String {
    let name = name.strip_prefix("./").unwrap_or(name);
    if name.ends_with(".lua") {
        name.to_string()
    } else {
        format!("{name}.lua")
    }
}

/// Per-run module registry and exports cache.
pub struct ModuleLoader {
    files: IndexMap<String, String>,
    packages: HashMap<String, String>,
    builtins: RefCell<HashMap<String, Value>>,
    loaded: RefCell<HashMap<String, Value>>,
    loading: RefCell<HashSet<String>>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new(files: IndexMap<String, String>, packages: HashMap<String, String>) -> Rc<Self> {
        Rc::new(Self {
            files,
            packages,
            builtins: RefCell::new(HashMap::new()),
            loaded: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
        })
    }

    /// Registers a builtin virtual module (`rover`, `readline`).
    pub fn register_builtin(&self, name: &str, exports: Value) {
        self.builtins.borrow_mut().insert(name.to_string(), exports);
    }

    /// Builtin lookup, used by the environment builder to also inject the
    /// API surface directly.
    #[must_use]
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn file_source(&self, name: &str) -> Option<String> {
        self.files.get(name).cloned()
    }

    /// Pre-seeds the exports cache for a file executed outside the loader
    /// (the entry file), so requiring it resolves instead of running its
    /// top-level code again.
    pub fn mark_loaded(&self, name: &str, exports: Value) {
        self.loaded.borrow_mut().insert(name.to_string(), exports);
    }

    /// Resolves `name` to its exports, executing the module on first use.
    ///
    /// # Errors
    ///
    /// `module not found` for unresolvable targets; any error the module
    /// itself raises during its single execution.
    pub async fn require(
        self: &Rc<Self>,
        ctx: &Rc<RunContext>,
        name: &str,
    ) -> mlua::Result<Value> {
        if let Some(exports) = self.builtin(name) {
            return Ok(exports);
        }

        let file_key = normalize_file_name(name);
        if self.files.contains_key(&file_key) {
            if let Some(exports) = self.loaded.borrow().get(&file_key) {
                return Ok(exports.clone());
            }
            let source = self.files[&file_key].clone();
            return self.execute(ctx, &file_key, source).await;
        }

        if self.packages.contains_key(name) {
            if let Some(exports) = self.loaded.borrow().get(name) {
                return Ok(exports.clone());
            }
            let source = self.packages[name].clone();
            return self.execute(ctx, name, source).await;
        }

        Err(to_lua_err(SimError::ModuleNotFound(name.to_string())))
    }

    /// Runs one module in a fresh capability environment and caches its
    /// return value. A `nil` return caches as `true`, the Lua convention for
    /// side-effect-only modules.
    async fn execute(
        self: &Rc<Self>,
        ctx: &Rc<RunContext>,
        key: &str,
        source: String,
    ) -> mlua::Result<Value> {
        if !self.loading.borrow_mut().insert(key.to_string()) {
            return Err(mlua::Error::RuntimeError(format!(
                "circular require of '{key}'"
            )));
        }
        tracing::debug!(module = %key, "executing module");

        let env = crate::env::build_env(ctx, self)?;
        let result = ctx
            .lua()
            .load(&source)
            .set_name(format!("@{key}"))
            .set_environment(env)
            .eval_async::<Value>()
            .await;
        self.loading.borrow_mut().remove(key);

        let value = result?;
        let exports = if value.is_nil() {
            Value::Boolean(true)
        } else {
            value
        };
        self.loaded
            .borrow_mut()
            .insert(key.to_string(), exports.clone());
        Ok(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;
    use rover_core::testing::RecordingHost;
    use rover_core::{MazeConfig, RunHost};
    use rover_sim::WorldState;

    fn test_ctx() -> (Rc<RunContext>, Rc<RecordingHost>) {
        let maze = MazeConfig {
            width: 1,
            height: 1,
            walls: vec![vec![false]],
            initial_robots: vec![],
            items: vec![],
            doors: vec![],
            pressure_plates: vec![],
            global_module: None,
        };
        let world = Rc::new(RefCell::new(WorldState::from_maze(&maze)));
        let maze = Rc::new(RefCell::new(maze));
        let host = Rc::new(RecordingHost::new());
        let ctx = RunContext::new(Lua::new(), maze, world, host.clone() as Rc<dyn RunHost>);
        (ctx, host)
    }

    fn loader_with(files: &[(&str, &str)]) -> Rc<ModuleLoader> {
        ModuleLoader::new(
            files
                .iter()
                .map(|(n, s)| ((*n).to_string(), (*s).to_string()))
                .collect(),
            HashMap::new(),
        )
    }

    #[test]
    fn file_name_normalization() {
        assert_eq!(normalize_file_name("./util"), "util.lua");
        assert_eq!(normalize_file_name("util.lua"), "util.lua");
        assert_eq!(normalize_file_name("util"), "util.lua");
    }

    #[tokio::test]
    async fn local_module_executes_once_and_caches_live_exports() {
        let (ctx, _host) = test_ctx();
        let loader = loader_with(&[(
            "counter.lua",
            "hits = (hits or 0) + 1\nreturn { calls = hits, bump = function(t) t.calls = t.calls + 100 end }",
        )]);

        let first = loader.require(&ctx, "./counter").await.unwrap();
        let second = loader.require(&ctx, "counter").await.unwrap();
        let third = loader.require(&ctx, "counter.lua").await.unwrap();

        // All specifier spellings resolve to the same single execution.
        let (Value::Table(a), Value::Table(b), Value::Table(c)) = (first, second, third) else {
            panic!("expected table exports");
        };
        assert_eq!(a.get::<u32>("calls").unwrap(), 1);

        // The cache holds the live table, not a copy.
        let bump: mlua::Function = a.get("bump").unwrap();
        bump.call::<()>(b.clone()).unwrap();
        assert_eq!(c.get::<u32>("calls").unwrap(), 101);
    }

    #[tokio::test]
    async fn nil_exports_cache_as_true() {
        let (ctx, _host) = test_ctx();
        let loader = loader_with(&[("side_effect.lua", "local x = 1")]);
        let exports = loader.require(&ctx, "side_effect").await.unwrap();
        assert_eq!(exports, Value::Boolean(true));
    }

    #[tokio::test]
    async fn unresolvable_target_is_module_not_found() {
        let (ctx, _host) = test_ctx();
        let loader = loader_with(&[]);
        let err = loader.require(&ctx, "nope").await.unwrap_err();
        assert_eq!(
            crate::error::sim_error_from(&err),
            Some(SimError::ModuleNotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn prefetched_package_resolves() {
        let (ctx, _host) = test_ctx();
        let mut packages = HashMap::new();
        packages.insert(
            "inspect".to_string(),
            "return function(v) return tostring(v) end".to_string(),
        );
        let loader = ModuleLoader::new(IndexMap::new(), packages);

        let exports = loader.require(&ctx, "inspect").await.unwrap();
        assert!(matches!(exports, Value::Function(_)));
    }

    #[tokio::test]
    async fn marked_loaded_file_is_not_reexecuted() {
        let (ctx, _host) = test_ctx();
        let loader = loader_with(&[("main.lua", "error('must not execute')")]);
        loader.mark_loaded("main.lua", Value::Boolean(true));
        let exports = loader.require(&ctx, "main").await.unwrap();
        assert_eq!(exports, Value::Boolean(true));
    }

    #[tokio::test]
    async fn circular_require_is_reported_not_hung() {
        let (ctx, _host) = test_ctx();
        let loader = loader_with(&[
            ("a.lua", r#"return require("b")"#),
            ("b.lua", r#"return require("a")"#),
        ]);
        let err = loader.require(&ctx, "a").await.unwrap_err();
        assert!(err.to_string().contains("circular require"), "got: {err}");
    }

    #[tokio::test]
    async fn module_sees_capability_env_not_real_globals() {
        let (ctx, host) = test_ctx();
        let loader = loader_with(&[(
            "caps.lua",
            "return { has_io = io ~= nil, has_console = console ~= nil, has_fetch = fetch ~= nil }",
        )]);

        let Value::Table(caps) = loader.require(&ctx, "caps").await.unwrap() else {
            panic!("expected table");
        };
        assert!(!caps.get::<bool>("has_io").unwrap());
        assert!(caps.get::<bool>("has_console").unwrap());
        assert!(caps.get::<bool>("has_fetch").unwrap());
        drop(host);
    }
}
