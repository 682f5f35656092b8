//! Mochi Runtime
//!
//! Boots the managed runtime, binds the entity bridge and runs a fixed
//! number of frames over the configured scene.

mod config;

use anyhow::{Context, Result};
use config::{RuntimeConfig, DEFAULT_CONFIG_FILE};
use mochi_core::scene::{EntityId, EntityRegistry, ManagedInstance};
use mochi_core::time::FixedStep;
use mochi_script::{
    DelegateBridge, DelegateDescriptor, LifecycleDelegates, RuntimeHost, ScriptBindings,
};
use std::ffi::{c_char, CString};
use tracing_subscriber::EnvFilter;

type CreateInstanceFn = extern "system" fn(u64, *const c_char);
type ClearAllFn = extern "system" fn();

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();

    tracing::info!("Mochi Runtime v{}", mochi_core::VERSION);

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = RuntimeConfig::load(&config_path)?;

    let mut host = RuntimeHost::new(config.host.clone());
    host.initialize(&config.runtime_dir, &config.entry_assembly)
        .with_context(|| format!("starting runtime from '{}'", config.runtime_dir.display()))?;

    let mut registry = EntityRegistry::new();
    let bindings = ScriptBindings::new(&registry);

    let result = run_scene(&host, &config, &mut registry, &bindings);

    unsafe { bindings.unregister() };
    host.shutdown();
    // Dropped only once the runtime is gone.
    drop(bindings);
    result
}

/// `RUST_LOG` directives, or `info` when unset or unparsable.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn run_scene(
    host: &RuntimeHost,
    config: &RuntimeConfig,
    registry: &mut EntityRegistry,
    bindings: &ScriptBindings,
) -> Result<()> {
    if config.run_entry_point {
        let code = host.execute_assembly(&config.entry_assembly, &[])?;
        tracing::info!("Entry point returned {}", code);
    }

    let scripting = &config.scripting;
    if let Some(callbacks_type) = &scripting.callbacks_type {
        let descriptor =
            ScriptBindings::register_descriptor(&scripting.bridge_assembly, callbacks_type);
        unsafe { bindings.register(host, &descriptor) }
            .context("registering native callbacks")?;
    }

    let lifecycle = unsafe {
        LifecycleDelegates::bind(host, &scripting.bridge_assembly, &scripting.bridge_type)
    }
    .context("binding entity lifecycle")?;

    let create_instance: Option<CreateInstanceFn> = match &scripting.create_instance_method {
        Some(method) => Some(
            unsafe {
                host.bind(&DelegateDescriptor::new(
                    &scripting.bridge_assembly,
                    &scripting.bridge_type,
                    method,
                ))
            }
            .context("binding script instantiation")?,
        ),
        None => None,
    };

    for entity in &config.scene.entities {
        let id = registry.create_entity(&entity.name);
        let Some(script) = &entity.script else {
            continue;
        };
        if let Some(create_instance) = create_instance {
            instantiate(create_instance, id, script)?;
        }
        registry.attach_script(id, script, ManagedInstance::null());
        registry.set_script_delegates(id, lifecycle.into());
    }

    let started = registry.start_all();
    tracing::info!("Started {} scripts", started);

    let mut clock = FixedStep::new(config.scene.tick_rate_hz);
    for _ in 0..config.scene.frames {
        let delta_time = clock.advance();
        registry.update_all(delta_time);
    }
    tracing::info!(
        "Ran {} frames ({:.3}s simulated)",
        clock.frame_count(),
        clock.elapsed().as_secs_f32()
    );

    for id in registry.ids() {
        if let Some(entity) = registry.entity(id) {
            tracing::info!("{} '{}' at {}", id, entity.name(), entity.transform.position);
        }
    }

    registry.shutdown(true);

    if let Some(method) = &scripting.clear_method {
        let clear_all: ClearAllFn = unsafe {
            host.bind(&DelegateDescriptor::new(
                &scripting.bridge_assembly,
                &scripting.bridge_type,
                method,
            ))
        }
        .context("binding script cleanup")?;
        clear_all();
    }

    Ok(())
}

fn instantiate(create_instance: CreateInstanceFn, id: EntityId, script: &str) -> Result<()> {
    let type_name = CString::new(script)
        .with_context(|| format!("script type name '{}' contains a nul byte", script))?;
    create_instance(id.get(), type_name.as_ptr());
    Ok(())
}
