//! Cross-container invariants: inheritance bounds, tree-wide sums,
//! controller freezing.

mod common;

use common::{alice, bob, test_host};
use stein::container::Prop;
use stein::{ContainerState, ContainerTree, Engine, Host, Principal};

fn setup() -> (ContainerTree, Engine, Host, Principal) {
    let host = test_host();
    let tree = ContainerTree::new();
    let engine = Engine::new();
    let client = Principal::superuser();
    (tree, engine, host, client)
}

#[test]
fn memory_guarantee_tree_sum_respects_reserve() {
    // host: 100 bytes total, 10 bytes reserve
    let (tree, engine, host, client) = setup();
    let a = tree.create("a", client.cred.clone(), true).unwrap();
    let b = tree.create("b", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "memory_guarantee", "60")
        .unwrap();

    // 60 + 40 + 10 reserve > 100: rejected, record untouched
    let err = engine
        .set(&tree, &host, &client, "b", "memory_guarantee", "40")
        .unwrap_err();
    assert!(matches!(
        err,
        stein_common::SteinError::ResourceNotAvailable { .. }
    ));
    assert_eq!(b.read().mem_guarantee, 0);
    assert!(!b.read().has_prop(Prop::MemGuarantee));

    engine
        .set(&tree, &host, &client, "b", "memory_guarantee", "30")
        .unwrap();
    assert_eq!(b.read().mem_guarantee, 30);

    // shrinking a guarantee always fits
    engine
        .set(&tree, &host, &client, "a", "memory_guarantee", "10")
        .unwrap();
    assert_eq!(a.read().mem_guarantee, 10);
}

#[test]
fn memory_guarantee_counts_subtree_maximum() {
    let (tree, engine, host, client) = setup();
    tree.create("p", client.cred.clone(), true).unwrap();
    tree.create("p/c", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "p/c", "memory_guarantee", "50")
        .unwrap();
    // the parent's own guarantee is absorbed by the child's 50
    engine
        .set(&tree, &host, &client, "p", "memory_guarantee", "40")
        .unwrap();
    assert_eq!(
        engine
            .get(&tree, &host, &client, "p", "memory_guarantee_total")
            .unwrap(),
        "50"
    );
}

#[test]
fn capability_limit_bounded_by_ancestors() {
    let (tree, engine, host, root) = setup();
    // parent owned and configured by host root: no clamping
    tree.create("p", root.cred.clone(), true).unwrap();
    engine
        .set(&tree, &host, &root, "p", "capabilities", "NET_ADMIN;SYS_ADMIN")
        .unwrap();

    tree.create("p/c", alice(), true).unwrap();
    let user = Principal::user(alice());

    // SYS_PTRACE is outside the parent's bounding set
    let err = engine
        .set(&tree, &host, &user, "p/c", "capabilities", "NET_ADMIN;SYS_PTRACE")
        .unwrap_err();
    assert!(err.is_permission());

    engine
        .set(&tree, &host, &user, "p/c", "capabilities", "NET_ADMIN")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &user, "p/c", "capabilities").unwrap(),
        "NET_ADMIN"
    );
}

#[test]
fn capability_indexed_membership() {
    let (tree, engine, host, _) = setup();
    tree.create("a", alice(), true).unwrap();
    let user = Principal::user(alice());

    engine
        .set(&tree, &host, &user, "a", "capabilities", "NET_ADMIN")
        .unwrap();
    assert_eq!(
        engine
            .get(&tree, &host, &user, "a", "capabilities[NET_ADMIN]")
            .unwrap(),
        "true"
    );
    assert_eq!(
        engine
            .get(&tree, &host, &user, "a", "capabilities[SYS_PTRACE]")
            .unwrap(),
        "false"
    );

    engine
        .set(&tree, &host, &user, "a", "capabilities[SYS_PTRACE]", "true")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &user, "a", "capabilities").unwrap(),
        "NET_ADMIN;SYS_PTRACE"
    );
}

#[test]
fn ambient_widens_the_bounding_set() {
    let (tree, engine, host, _) = setup();
    tree.create("a", alice(), true).unwrap();
    let user = Principal::user(alice());

    engine
        .set(&tree, &host, &user, "a", "capabilities", "NET_ADMIN")
        .unwrap();
    engine
        .set(&tree, &host, &user, "a", "capabilities_ambient", "NET_BIND_SERVICE")
        .unwrap();

    let limit = engine.get(&tree, &host, &user, "a", "capabilities").unwrap();
    assert!(limit.contains("NET_BIND_SERVICE"), "limit is {limit}");
    assert!(limit.contains("NET_ADMIN"));

    // SYS_ADMIN is never in an unprivileged allowed set
    let err = engine
        .set(&tree, &host, &user, "a", "capabilities_ambient", "SYS_ADMIN")
        .unwrap_err();
    assert!(err.is_permission());
}

#[test]
fn cpu_limit_bounded_by_parent_for_unprivileged_clients() {
    let (tree, engine, host, root) = setup();
    tree.create("p", alice(), true).unwrap();
    tree.create("p/c", alice(), true).unwrap();
    let user = Principal::user(alice());

    engine.set(&tree, &host, &user, "p", "cpu_limit", "2c").unwrap();

    let err = engine
        .set(&tree, &host, &user, "p/c", "cpu_limit", "3c")
        .unwrap_err();
    assert!(err.is_invalid_value());

    engine.set(&tree, &host, &user, "p/c", "cpu_limit", "1c").unwrap();

    // host root may overcommit
    engine.set(&tree, &host, &root, "p/c", "cpu_limit", "3c").unwrap();

    // nobody can exceed the core count
    let err = engine
        .set(&tree, &host, &root, "p/c", "cpu_limit", "5c")
        .unwrap_err();
    assert!(err.is_invalid_value());
}

#[test]
fn cpu_guarantee_above_parent_warns_but_commits() {
    let (tree, engine, host, client) = setup();
    tree.create("p", client.cred.clone(), true).unwrap();
    tree.create("p/c", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "p", "cpu_guarantee", "1c")
        .unwrap();
    engine
        .set(&tree, &host, &client, "p/c", "cpu_guarantee", "2c")
        .unwrap();
    assert_eq!(
        engine.get(&tree, &host, &client, "p/c", "cpu_guarantee").unwrap(),
        "2c"
    );
}

#[test]
fn cpu_policy_derives_scheduling_triple() {
    let (tree, engine, host, client) = setup();
    let ct = tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "cpu_policy", "rt")
        .unwrap();
    {
        let ct = ct.read();
        // smart host: rt approximated with nice
        assert_eq!(ct.sched_policy.raw(), 0);
        assert_eq!(ct.sched_nice, host.config.rt_nice);
    }

    engine
        .set(&tree, &host, &client, "a", "cpu_policy", "iso")
        .unwrap();
    {
        let ct = ct.read();
        assert_eq!(ct.sched_policy.raw(), 4);
        assert_eq!(ct.sched_nice, host.config.high_nice);
    }

    engine
        .set(&tree, &host, &client, "a", "cpu_policy", "normal")
        .unwrap();
    {
        let ct = ct.read();
        assert_eq!(ct.sched_policy.raw(), 0);
        assert_eq!(ct.sched_prio, 0);
        assert_eq!(ct.sched_nice, 0);
    }
}

#[test]
fn access_level_cannot_exceed_restrictive_ancestor() {
    let (tree, engine, host, root) = setup();
    tree.create("p", alice(), true).unwrap();
    tree.create("p/c", alice(), true).unwrap();
    let user = Principal::user(alice());

    engine
        .set(&tree, &host, &user, "p", "enable_stein", "read-only")
        .unwrap();

    let err = engine
        .set(&tree, &host, &user, "p/c", "enable_stein", "true")
        .unwrap_err();
    assert!(err.is_permission());

    // lowering is always fine
    engine
        .set(&tree, &host, &user, "p/c", "enable_stein", "false")
        .unwrap();

    // host root may elevate
    engine
        .set(&tree, &host, &root, "p/c", "enable_stein", "true")
        .unwrap();
}

#[test]
fn controllers_freeze_once_running() {
    let (tree, engine, host, client) = setup();
    let ct = tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "memory_limit", "4K")
        .unwrap();
    assert!(ct.read().controllers.contains(stein::Controllers::MEMORY));
    assert!(ct
        .read()
        .required_controllers
        .contains(stein::Controllers::MEMORY));

    engine
        .set(&tree, &host, &client, "a", "command", "/bin/sh")
        .unwrap();
    tree.start("a").unwrap();
    tree.started("a", 42, 1, 41).unwrap();

    // PIDS was never enabled: refused at runtime, mask untouched
    let before = ct.read().controllers;
    let err = engine
        .set(&tree, &host, &client, "a", "thread_limit", "100")
        .unwrap_err();
    assert!(err.is_not_supported());
    assert_eq!(ct.read().controllers, before);
    assert!(!ct.read().has_prop(Prop::ThreadLimit));

    // MEMORY is already enabled: dynamic updates keep working
    engine
        .set(&tree, &host, &client, "a", "memory_limit", "8K")
        .unwrap();
}

#[test]
fn controllers_property_keeps_required_subset() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "memory_limit", "4K")
        .unwrap();

    let err = engine
        .set(&tree, &host, &client, "a", "controllers", "cpu")
        .unwrap_err();
    assert!(err.is_invalid_value());

    engine
        .set(&tree, &host, &client, "a", "controllers", "memory;cpu;freezer")
        .unwrap();
    assert_eq!(
        engine
            .get(&tree, &host, &client, "a", "controllers[cpu]")
            .unwrap(),
        "true"
    );
}

#[test]
fn net_priority_range_checked() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine
        .set(&tree, &host, &client, "a", "net_priority", "eth0: 5; default: 3")
        .unwrap();
    assert_eq!(
        engine
            .get(&tree, &host, &client, "a", "net_priority[eth0]")
            .unwrap(),
        "5"
    );

    let err = engine
        .set(&tree, &host, &client, "a", "net_priority", "eth0: 9")
        .unwrap_err();
    assert!(err.is_invalid_value());

    let err = engine
        .set(&tree, &host, &client, "a", "net_priority[eth0]", "8")
        .unwrap_err();
    assert!(err.is_invalid_value());
    assert_eq!(
        engine
            .get(&tree, &host, &client, "a", "net_priority[eth0]")
            .unwrap(),
        "5"
    );
}

#[test]
fn net_plan_validation_and_controller_activation() {
    let (tree, engine, host, client) = setup();
    let ct = tree.create("a", client.cred.clone(), true).unwrap();

    // purely inherited: no traffic-class controller needed
    engine
        .set(&tree, &host, &client, "a", "net", "inherited")
        .unwrap();
    assert!(!ct.read().controllers.contains(stein::Controllers::NETCLS));

    engine
        .set(&tree, &host, &client, "a", "net", "veth eth0 br0 1450")
        .unwrap();
    assert!(ct.read().controllers.contains(stein::Controllers::NETCLS));

    assert!(engine
        .set(&tree, &host, &client, "a", "net", "warp drive")
        .is_err());
    assert!(engine
        .set(&tree, &host, &client, "a", "ip", "eth0 nodash")
        .is_err());
    engine
        .set(&tree, &host, &client, "a", "ip", "eth0 10.1.2.3/24")
        .unwrap();
    engine
        .set(&tree, &host, &client, "a", "default_gw", "eth0 10.1.2.1")
        .unwrap();
}

#[test]
fn ownership_gates_configuration() {
    let (tree, engine, host, _) = setup();
    tree.create("a", alice(), true).unwrap();

    let stranger = Principal::user(bob());
    let err = engine
        .set(&tree, &host, &stranger, "a", "command", "/bin/sh")
        .unwrap_err();
    assert!(err.is_permission());

    let owner = Principal::user(alice());
    engine
        .set(&tree, &host, &owner, "a", "command", "/bin/sh")
        .unwrap();
}

#[test]
fn weak_and_dead_listings_follow_lifecycle() {
    let (tree, engine, host, client) = setup();
    tree.create("a", client.cred.clone(), true).unwrap();

    engine.set(&tree, &host, &client, "a", "weak", "true").unwrap();
    assert_eq!(tree.weak_containers(), vec!["a".to_string()]);

    engine
        .set(&tree, &host, &client, "a", "command", "/bin/sh")
        .unwrap();
    engine
        .set(&tree, &host, &client, "a", "aging_time", "1")
        .unwrap();
    tree.start("a").unwrap();
    tree.started("a", 42, 1, 41).unwrap();
    tree.exit("a", 0, false).unwrap();

    let death = tree.find("a").unwrap().read().death_time;
    assert_eq!(tree.expired_dead(death + 2000), vec!["a".to_string()]);
    assert_eq!(
        tree.find("a").unwrap().read().state,
        ContainerState::Dead
    );
}
