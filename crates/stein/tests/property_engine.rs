//! End-to-end property engine behaviour: guards, codecs, subscripts,
//! visibility.

mod common;

use common::{alice, test_host, STORED_OUTPUT};
use stein::container::Prop;
use stein::{ContainerTree, Engine, Host, Principal};

fn setup() -> (ContainerTree, Engine, Host, Principal) {
    let host = test_host();
    let tree = ContainerTree::new();
    let engine = Engine::new();
    let client = Principal::superuser();
    (tree, engine, host, client)
}

#[test]
fn set_then_get_normalizes() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "memory_limit", "2K")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "memory_limit").unwrap(),
        "2048"
    );

    engine.set(&tree, &host, &client, "a", "umask", "0755").unwrap();
    assert_eq!(engine.get(&tree, &host, &client, "a", "umask").unwrap(), "0755");

    engine
        .set(&tree, &host, &client, "a", "aging_time", "60")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "aging_time").unwrap(),
        "60"
    );

    // 50% of a 4-core host
    engine
        .set(&tree, &host, &client, "a", "cpu_limit", "50")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "cpu_limit").unwrap(),
        "2c"
    );
}

#[test]
fn bad_values_are_rejected_with_invalid_value() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    for (prop, value) in [
        ("memory_limit", "10x"),
        ("root_readonly", "yes"),
        ("umask", "999"),
        ("cpu_limit", "-1c"),
        ("virt_mode", "vm"),
        ("cpu_policy", "fast"),
        ("max_respawns", "many"),
    ] {
        let err = engine.set(&tree, &host, &client, "a", prop, value).unwrap_err();
        assert!(err.is_invalid_value(), "{prop}={value} gave {err}");
    }
}

#[test]
fn state_guard_blocks_runtime_reconfiguration() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "command", "/bin/sh")
        .unwrap();
    tree.start("a").unwrap();
    tree.started("a", 42, 1, 41).unwrap();

    let err = engine
        .set(&tree, &host, &client, "a", "command", "/bin/true")
        .unwrap_err();
    assert!(err.is_invalid_state());

    // dynamic properties stay settable while running
    engine
        .set(&tree, &host, &client, "a", "respawn", "true")
        .unwrap();

    // nothing is settable once dead
    tree.exit("a", 0, false).unwrap();
    let err = engine
        .set(&tree, &host, &client, "a", "respawn", "false")
        .unwrap_err();
    assert!(err.is_invalid_state());

    tree.stop("a").unwrap();
    engine
        .set(&tree, &host, &client, "a", "command", "/bin/true")
        .unwrap();
}

#[test]
fn presence_bit_tracks_successful_sets_only() {
    let (tree, engine, host, client) = setup();
    let ct = tree.create("a", client.cred.clone(), true).unwrap();

    assert!(!ct.read().has_prop(Prop::MemLimit));

    assert!(engine
        .set(&tree, &host, &client, "a", "memory_limit", "10x")
        .is_err());
    assert!(!ct.read().has_prop(Prop::MemLimit));
    assert_eq!(ct.read().mem_limit, 0);

    engine
        .set(&tree, &host, &client, "a", "memory_limit", "4K")
        .unwrap();
    assert!(ct.read().has_prop(Prop::MemLimit));

    // below the configured minimum: rejected, record unchanged
    let err = engine
        .set(&tree, &host, &client, "a", "memory_limit", "512")
        .unwrap_err();
    assert!(err.is_invalid_value());
    assert_eq!(ct.read().mem_limit, 4096);
}

#[test]
fn env_indexed_operations() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "env", "A=1;B=2")
        .unwrap();
    engine.set(&tree, &host, &client, "a", "env[C]", "3").unwrap();
    engine.set(&tree, &host, &client, "a", "env[A]", "9").unwrap();

    assert_eq!(engine.get(&tree, &host, &client, "a", "env[A]").unwrap(), "9");
    assert_eq!(engine.get(&tree, &host, &client, "a", "env[C]").unwrap(), "3");
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "env").unwrap(),
        "A=9;B=2;C=3"
    );
    assert!(engine.get(&tree, &host, &client, "a", "env[NOPE]").is_err());
    assert!(engine
        .set(&tree, &host, &client, "a", "env", "NOEQUALS")
        .is_err());
}

#[test]
fn env_indexed_reads_inherit_from_ancestors() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();
    tree.create("a/b", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "env", "SHARED=yes")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a/b", "env[SHARED]").unwrap(),
        "yes"
    );
}

#[test]
fn ulimit_entries_parse_and_delete() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(
            &tree,
            &host,
            &client,
            "a",
            "ulimit",
            "nofile: 1024 2048; core: unlimited unlimited",
        )
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "ulimit[nofile]").unwrap(),
        "1024 2048"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "ulimit").unwrap(),
        "core: unlimited unlimited; nofile: 1024 2048"
    );

    // empty indexed value removes the entry
    engine
        .set(&tree, &host, &client, "a", "ulimit[core]", "")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "ulimit").unwrap(),
        "nofile: 1024 2048"
    );

    assert!(engine
        .set(&tree, &host, &client, "a", "ulimit", "warp: 1 2")
        .is_err());
    assert!(engine
        .set(&tree, &host, &client, "a", "ulimit", "nofile: 1")
        .is_err());
}

#[test]
fn stdout_limit_capped_for_unprivileged_clients() {
    let (tree, engine, host, root) = setup();
    tree.create("a", alice(), true).unwrap();
    let user = Principal::user(alice());

    let err = engine
        .set(&tree, &host, &user, "a", "stdout_limit", "2000")
        .unwrap_err();
    assert!(err.is_invalid_value());

    engine
        .set(&tree, &host, &user, "a", "stdout_limit", "500")
        .unwrap();
    // root is not capped
    engine
        .set(&tree, &host, &root, "a", "stdout_limit", "2000")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &root, "a", "stdout_limit").unwrap(),
        "2000"
    );
}

#[test]
fn stdout_read_supports_offset_and_length() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    // not readable while stopped
    assert!(engine.get(&tree, &host, &client, "a", "stdout").is_err());

    engine
        .set(&tree, &host, &client, "a", "command", "/bin/sh")
        .unwrap();
    tree.start("a").unwrap();
    tree.started("a", 42, 1, 41).unwrap();

    assert_eq!(
        engine.get(&tree, &host, &client, "a", "stdout").unwrap(),
        STORED_OUTPUT
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "stdout[2:3]").unwrap(),
        "234"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "stdout[7]").unwrap(),
        "789"
    );
    assert!(engine
        .get(&tree, &host, &client, "a", "stdout[x:y]")
        .is_err());
}

#[test]
fn listing_hides_hidden_and_unsupported_properties() {
    let (_, engine, host, _) = setup();
    let names = engine.list_properties(&host);

    assert!(names.contains(&"command"));
    assert!(names.contains(&"memory_limit"));
    assert!(names.contains(&"capabilities_ambient"));
    assert!(!names.contains(&"_root_pid"));
    assert!(!names.contains(&"stein_stat"));
    assert!(!names.contains(&"net_tos"));

    // no ambient capability support drops the property from the listing
    let mut host = host;
    host.info.has_ambient_caps = false;
    assert!(!engine.list_properties(&host).contains(&"capabilities_ambient"));
}

#[test]
fn read_only_and_unknown_properties() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    let err = engine
        .set(&tree, &host, &client, "a", "absolute_name", "/x")
        .unwrap_err();
    assert!(err.is_invalid_value());

    let err = engine
        .set(&tree, &host, &client, "a", "no_such_prop", "1")
        .unwrap_err();
    assert!(matches!(err, stein_common::SteinError::InvalidProperty { .. }));

    let err = engine
        .get(&tree, &host, &client, "missing", "command")
        .unwrap_err();
    assert!(matches!(err, stein_common::SteinError::InvalidProperty { .. }));
}

#[test]
fn derived_names_and_counters() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    assert_eq!(
        engine.get(&tree, &host, &client, "a", "absolute_name").unwrap(),
        "/stein/a"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "parent").unwrap(),
        "/"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "state").unwrap(),
        "stopped"
    );

    engine
        .set(&tree, &host, &client, "a", "command", "/bin/sh")
        .unwrap();
    tree.start("a").unwrap();
    tree.started("a", 42, 1, 41).unwrap();

    assert_eq!(
        engine.get(&tree, &host, &client, "a", "memory_usage").unwrap(),
        "4096"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "minor_faults").unwrap(),
        "90"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "major_faults").unwrap(),
        "10"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "process_count").unwrap(),
        "3"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "net_bytes[eth0]").unwrap(),
        "1000"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "io_read").unwrap(),
        "fs: 300; sda: 100"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "io_ops[sda]").unwrap(),
        "15"
    );
    assert_eq!(
        engine.get(&tree, &host, &client, "a", "root_pid").unwrap(),
        "42"
    );
}

#[test]
fn virt_mode_switch_resanitizes_capabilities() {
    let (tree, engine, host, _) = setup();
    tree.create("a", alice(), true).unwrap();
    let user = Principal::user(alice());

    let app_caps = engine.get(&tree, &host, &user, "a", "capabilities").unwrap();
    engine.set(&tree, &host, &user, "a", "virt_mode", "os").unwrap();
    let os_caps = engine.get(&tree, &host, &user, "a", "capabilities").unwrap();

    assert_ne!(app_caps, os_caps);
    assert!(os_caps.contains("SYS_CHROOT"));
}
