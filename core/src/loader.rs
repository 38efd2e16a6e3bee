//! Service loader: converge one managed service.
//!
//! The package is always installed explicitly first, because an install
//! implied by `hab svc load` may happen asynchronously and fail silently.
//! User config and the group key are placed next, then the load decision
//! runs.

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::compose::{install_options, load_options};
use crate::error::{ProvisionError, Result};
use crate::infrastructure::Remote;
use crate::types::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Already running; nothing issued.
    AlreadyLoaded,
    Loaded,
    /// Unloaded and loaded again.
    Reloaded,
    /// Unloaded on request; never loaded.
    Unloaded,
}


// ---------------------------------------------------------------------------
// LoadPlan
// ---------------------------------------------------------------------------

/// The load decision for a pair of `{reload, unload}` flags.
///
/// | reload | unload | plan |
/// |---|---|---|
/// | false | false | probe; load if not loaded |
/// | true | false | unload, probe, load if not loaded |
/// | any | true | unload only |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub unload_first: bool,
    pub may_load: bool,
}

impl LoadPlan {
    pub fn for_flags(reload: bool, unload: bool) -> Self {
        LoadPlan {
            unload_first: reload || unload,
            may_load: !unload,
        }
    }

    /// Outcome once the already-loaded probe (if any) has answered.
    pub fn outcome(&self, already_loaded: bool) -> LoadOutcome {
        match (self.may_load, already_loaded, self.unload_first) {
            (false, _, _) => LoadOutcome::Unloaded,
            (true, true, _) => LoadOutcome::AlreadyLoaded,
            (true, false, true) => LoadOutcome::Reloaded,
            (true, false, false) => LoadOutcome::Loaded,
        }
    }
}


// ---------------------------------------------------------------------------
// converge_service
// ---------------------------------------------------------------------------

pub fn converge_service(backend: &dyn Backend, service: &Service, remote: &mut Remote<'_>) -> Result<LoadOutcome> {
    backend.install_package(remote, service, &install_options(service))?;

    if let Some(content) = service.user_config() {
        backend.place_user_config(remote, service, content)?;
    }

    if let Some(key) = service.service_key.as_deref().filter(|k| !k.is_empty()) {
        let name = service.service_key_name().ok_or_else(|| {
            ProvisionError::config(
                format!("{}.service_key", service.ident),
                "must name the key on its second line",
            )
        })?;
        backend.place_service_key(remote, name, key)?;
    }

    let options = load_options(service);
    let plan = LoadPlan::for_flags(service.reload, service.unload);

    if plan.unload_first {
        tracing::info!("Unloading service {} ...", service.ident);
        backend.unload_service(remote, service);
    }
    if !plan.may_load {
        return Ok(plan.outcome(false));
    }

    let already_loaded = backend.service_loaded(remote, service);
    if !already_loaded {
        tracing::info!("Loading service {}", service.ident);
        backend.load_service(remote, service, &options)?;
    }
    Ok(plan.outcome(already_loaded))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinuxBackend;
    use crate::error::ProvisionError;
    use crate::infrastructure::{MemorySink, MockSession};
    use crate::types::{Bind, PackageIdent, ProvisionerConfig};

    const STATUS: &str = "hab svc status core/redis";
    const UNLOAD: &str = "hab svc unload core/redis";
    const LOAD: &str = "hab svc load core/redis";

    fn redis(reload: bool, unload: bool) -> Service {
        Service {
            reload,
            unload,
            ..Service::new(PackageIdent::new("core", "redis"))
        }
    }

    fn run(service: &Service, loaded: bool) -> (Result<LoadOutcome>, MockSession) {
        let backend = LinuxBackend::new(&ProvisionerConfig::default());
        let mut session = MockSession::new();
        if !loaded {
            session.fail_when(STATUS);
        }
        let sink = MemorySink::new();
        let result = converge_service(&backend, service, &mut Remote::new(&mut session, &sink));
        (result, session)
    }

    #[test]
    fn plan_table() {
        assert_eq!(LoadPlan::for_flags(false, false), LoadPlan { unload_first: false, may_load: true });
        assert_eq!(LoadPlan::for_flags(true, false), LoadPlan { unload_first: true, may_load: true });
        assert_eq!(LoadPlan::for_flags(false, true), LoadPlan { unload_first: true, may_load: false });
        assert_eq!(LoadPlan::for_flags(true, true), LoadPlan { unload_first: true, may_load: false });
    }

    #[test]
    fn no_flags_already_loaded_is_noop() {
        let (result, session) = run(&redis(false, false), true);
        assert_eq!(result.unwrap(), LoadOutcome::AlreadyLoaded);
        assert!(session.ran(STATUS));
        assert!(!session.ran(LOAD));
        assert!(!session.ran(UNLOAD));
    }

    #[test]
    fn no_flags_not_loaded_loads() {
        let (result, session) = run(&redis(false, false), false);
        assert_eq!(result.unwrap(), LoadOutcome::Loaded);
        assert!(session.ran(LOAD));
        assert!(!session.ran(UNLOAD));
    }

    #[test]
    fn reload_unloads_then_loads() {
        let (result, session) = run(&redis(true, false), false);
        assert_eq!(result.unwrap(), LoadOutcome::Reloaded);
        let unload = session.position(UNLOAD).unwrap();
        let status = session.position(STATUS).unwrap();
        let load = session.position(LOAD).unwrap();
        assert!(unload < status && status < load);
    }

    #[test]
    fn reload_still_loaded_after_unload_is_noop() {
        let (result, session) = run(&redis(true, false), true);
        assert_eq!(result.unwrap(), LoadOutcome::AlreadyLoaded);
        assert!(session.ran(UNLOAD));
        assert!(!session.ran(LOAD));
    }

    #[test]
    fn unload_never_loads() {
        for reload in [false, true] {
            for loaded in [false, true] {
                let (result, session) = run(&redis(reload, true), loaded);
                assert_eq!(result.unwrap(), LoadOutcome::Unloaded);
                assert!(session.ran(UNLOAD));
                assert!(!session.ran(STATUS));
                assert!(!session.ran(LOAD));
            }
        }
    }

    #[test]
    fn unload_failure_is_swallowed() {
        let backend = LinuxBackend::new(&ProvisionerConfig::default());
        let mut session = MockSession::new();
        session.fail_when(UNLOAD);
        session.fail_when(STATUS);
        let sink = MemorySink::new();
        let outcome = converge_service(&backend, &redis(true, false), &mut Remote::new(&mut session, &sink)).unwrap();
        assert_eq!(outcome, LoadOutcome::Reloaded);
    }

    #[test]
    fn install_runs_first_and_failure_aborts() {
        let backend = LinuxBackend::new(&ProvisionerConfig::default());
        let mut session = MockSession::new();
        session.fail_when("hab pkg install core/redis");
        let sink = MemorySink::new();
        let err = converge_service(&backend, &redis(false, false), &mut Remote::new(&mut session, &sink)).unwrap_err();
        assert!(matches!(err, ProvisionError::Command { .. }));
        assert_eq!(session.commands.len(), 1);
    }

    #[test]
    fn config_and_key_placed_before_load() {
        let service = Service {
            user_toml: Some("port = 6380\n".into()),
            service_key: Some("BOX-SEC-1\nredis.default@org-20240101\n\nsecret".into()),
            binds: vec![Bind::new("backend", "bar", "default")],
            ..redis(false, false)
        };
        let (result, session) = run(&service, false);
        assert_eq!(result.unwrap(), LoadOutcome::Loaded);
        assert!(session.uploaded("/tmp/redis.default@org-20240101.box.key").is_some());
        assert!(session.ran("mv /tmp/redis.default@org-20240101.box.key /hab/cache/keys/redis.default@org-20240101.box.key"));
        assert!(session.ran("hab svc load core/redis --bind backend:bar.default"));
        assert!(session.position("user.toml").unwrap() < session.position(LOAD).unwrap());
    }

    #[test]
    fn unnamed_service_key_fails_before_load() {
        let service = Service {
            service_key: Some("single-line-key".into()),
            ..redis(false, false)
        };
        let (result, session) = run(&service, false);
        match result.unwrap_err() {
            ProvisionError::Config(faults) => assert_eq!(faults[0].field, "core/redis.service_key"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.uploads.is_empty());
        assert!(!session.ran(LOAD));
    }

    #[test]
    fn blank_user_config_is_skipped() {
        let service = Service {
            user_toml: Some("   \n".into()),
            ..redis(false, false)
        };
        let (_, session) = run(&service, true);
        assert!(!session.ran("/hab/user/"));
        assert!(session.uploads.is_empty());
    }
}
