//! Builder and configuration plumbing.

mod common;

use ringloop::runtime::env_config::{ENV_CLEANUP_QUOTA, ENV_VIRTUAL_TIME};
use ringloop::time::sleep;
use ringloop::{Runtime, RuntimeBuilder};
use std::sync::Mutex;
use std::time::Duration;

// The process environment is global; env tests serialize on this.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn env_overrides_configure_the_runtime() {
    common::init_logging();
    let _env = ENV_LOCK.lock().expect("env lock");
    std::env::set_var(ENV_VIRTUAL_TIME, "1");
    std::env::set_var(ENV_CLEANUP_QUOTA, "3");

    let rt = RuntimeBuilder::new()
        .with_env_overrides()
        .expect("env values parse")
        .build()
        .expect("virtual-time build needs no kernel ring");

    std::env::remove_var(ENV_VIRTUAL_TIME);
    std::env::remove_var(ENV_CLEANUP_QUOTA);

    // Virtual time: a long sleep returns immediately in wall time.
    let started = std::time::Instant::now();
    rt.block_on(async {
        sleep(Duration::from_secs(60)).await?;
        Ok(())
    })
    .expect("virtual sleep completes");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn invalid_env_value_is_a_build_error() {
    common::init_logging();
    let _env = ENV_LOCK.lock().expect("env lock");
    std::env::set_var(ENV_CLEANUP_QUOTA, "many");
    let result = RuntimeBuilder::new().with_env_overrides();
    std::env::remove_var(ENV_CLEANUP_QUOTA);
    assert!(result.is_err());
}

#[test]
fn builder_is_fluent_and_moves() {
    common::init_logging();
    let rt = RuntimeBuilder::new()
        .ring_entries(32)
        .completion_batch(8)
        .cleanup_quota(2)
        .warn_unobserved_failures(false)
        .virtual_time(true)
        .build()
        .expect("builds");
    rt.block_on(async { Ok(()) }).expect("empty body runs");
}

#[test]
fn runtime_spawn_before_block_on_runs() {
    let (rt, _handle) = common::lab();
    let pre = rt.spawn(async {
        sleep(Duration::from_millis(1)).await?;
        Ok(41_u32)
    });
    let result = rt.block_on(async move {
        let value = pre.await?;
        Ok(value + 1)
    });
    assert_eq!(result.expect("pre-spawned task joined"), 42);
}

#[test]
fn lab_runtime_pairs_with_its_handle() {
    let (rt, handle) = Runtime::lab();
    handle.add_file("/x", b"1".to_vec());
    rt.block_on(async {
        let file = ringloop::fs::File::open("/x").await?;
        file.close().await?;
        Ok(())
    })
    .expect("handle fixtures are visible to the runtime");
}
