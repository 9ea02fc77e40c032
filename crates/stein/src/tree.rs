//! The container tree: name index, parent/child links, lifecycle entry
//! points, and cross-container walks.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use stein_common::{Cred, SteinError, SteinResult};

use crate::container::{now_ms, Container, ContainerRef, ContainerState, Prop};

/// Longest accepted container name.
const MAX_NAME_LEN: usize = 128;

/// All containers, indexed by name. The root node is synthetic, always
/// present, and permanently running.
pub struct ContainerTree {
    root: ContainerRef,
    index: RwLock<BTreeMap<String, ContainerRef>>,
}

fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('/').map(|(parent, _)| parent)
}

fn validate_name(name: &str) -> SteinResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(SteinError::invalid_value(format!(
            "Invalid container name: {name}"
        )));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(SteinError::invalid_value(format!(
                "Invalid container name: {name}"
            )));
        }
        for c in component.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | '@') {
                return Err(SteinError::invalid_value(format!(
                    "Invalid container name: {name}"
                )));
            }
        }
    }
    Ok(())
}

impl ContainerTree {
    /// Create a tree holding only the root container.
    #[must_use]
    pub fn new() -> Self {
        let mut root = Container::new("/", std::sync::Weak::new(), Cred::root());
        root.state = ContainerState::Running;
        root.sanitize_capabilities(true);
        Self {
            root: Arc::new(RwLock::new(root)),
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// The synthetic root.
    #[must_use]
    pub fn root(&self) -> ContainerRef {
        self.root.clone()
    }

    /// Look a container up by name; `/` resolves to the root.
    pub fn find(&self, name: &str) -> SteinResult<ContainerRef> {
        if name == "/" {
            return Ok(self.root.clone());
        }
        self.index
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SteinError::invalid_property(format!("Container not found: {name}")))
    }

    /// Number of containers excluding the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// True when only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Names in stable (sorted) order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.index.read().keys().cloned().collect()
    }

    /// Create a container under its path-implied parent.
    ///
    /// `a/b` becomes a child of `a`, which must already exist; a top-level
    /// name becomes a child of the root.
    pub fn create(
        &self,
        name: &str,
        owner: Cred,
        has_ambient_caps: bool,
    ) -> SteinResult<ContainerRef> {
        validate_name(name)?;

        let mut index = self.index.write();
        if index.contains_key(name) {
            return Err(SteinError::invalid_value(format!(
                "Container already exists: {name}"
            )));
        }

        let parent = match parent_name(name) {
            Some(parent) => index
                .get(parent)
                .cloned()
                .ok_or_else(|| {
                    SteinError::invalid_property(format!("Parent container not found: {parent}"))
                })?,
            None => self.root.clone(),
        };

        if parent.read().state == ContainerState::Dead {
            return Err(SteinError::invalid_state(format!(
                "Parent container is dead: {name}"
            )));
        }

        let mut ct = Container::new(name, Arc::downgrade(&parent), owner);
        ct.sanitize_capabilities(has_ambient_caps);
        ct.set_prop(Prop::State);
        ct.set_prop(Prop::CreationTime);
        let ct = Arc::new(RwLock::new(ct));

        parent.write().children.push(ct.clone());
        index.insert(name.to_string(), ct.clone());

        tracing::info!(container = %name, "container created");
        Ok(ct)
    }

    /// Remove a container and its whole subtree from the tree.
    pub fn destroy(&self, name: &str) -> SteinResult<()> {
        let ct = self.find(name)?;
        if Arc::ptr_eq(&ct, &self.root) {
            return Err(SteinError::permission("Cannot destroy the root container"));
        }

        let mut index = self.index.write();
        let prefix = format!("{name}/");
        index.retain(|key, _| key != name && !key.starts_with(&prefix));

        if let Some(parent) = ct.read().parent.upgrade() {
            parent
                .write()
                .children
                .retain(|child| !Arc::ptr_eq(child, &ct));
        }

        tracing::info!(container = %name, "container destroyed");
        Ok(())
    }

    /// Begin starting a stopped container. The launcher collaborator calls
    /// [`ContainerTree::started`] or [`ContainerTree::start_failed`] to
    /// finish the transition.
    pub fn start(&self, name: &str) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        {
            let ct = ct_ref.read();
            if !ct.state.can_start() {
                return Err(SteinError::invalid_state(format!(
                    "Cannot start container in state {}",
                    ct.state
                )));
            }
            if ct.command.is_empty() {
                return Err(SteinError::invalid_value("container command is empty"));
            }
            if let Some(parent) = ct.parent.upgrade() {
                let parent_state = parent.read().state;
                if parent_state == ContainerState::Paused {
                    return Err(SteinError::invalid_state("Parent container is paused"));
                }
                if parent_state == ContainerState::Dead {
                    return Err(SteinError::invalid_state("Parent container is dead"));
                }
            }
        }

        let mut ct = ct_ref.write();
        let required_controllers = ct.required_controllers;
        ct.controllers |= required_controllers;
        ct.oom_killed = false;
        ct.exit_status = 0;
        ct.set_state(ContainerState::Starting);
        Ok(())
    }

    /// The launcher reports a successful start.
    pub fn started(&self, name: &str, pid: u32, vpid: u32, wait_pid: u32) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        {
            let mut ct = ct_ref.write();
            if ct.state != ContainerState::Starting {
                return Err(SteinError::invalid_state(format!(
                    "Container not starting: {name}"
                )));
            }
            ct.task_pid = pid;
            ct.task_vpid = vpid;
            ct.wait_task_pid = wait_pid;
            ct.set_prop(Prop::RootPid);
            ct.start_time = now_ms();
            ct.set_prop(Prop::StartTime);
            if ct.real_start_time == 0 {
                ct.real_start_time = now_ms();
                ct.set_prop(Prop::RealStartTime);
            }
            ct.clear_prop(Prop::DeathTime);
            ct.set_state(ContainerState::Running);
        }
        self.update_running_children(&ct_ref, 1);
        Ok(())
    }

    /// The launcher reports a failed start; the record rolls back to
    /// `Stopped`.
    pub fn start_failed(&self, name: &str) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        let mut ct = ct_ref.write();
        if ct.state != ContainerState::Starting {
            return Err(SteinError::invalid_state(format!(
                "Container not starting: {name}"
            )));
        }
        ct.task_pid = 0;
        ct.task_vpid = 0;
        ct.wait_task_pid = 0;
        ct.set_state(ContainerState::Stopped);
        Ok(())
    }

    /// Record the task's exit and move the container to `Dead`.
    pub fn exit(&self, name: &str, status: i32, oom_killed: bool) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        let was_running;
        {
            let mut ct = ct_ref.write();
            if !ct.state.is_alive() {
                return Err(SteinError::invalid_state(format!(
                    "Container not running: {name}"
                )));
            }
            was_running = ct.state == ContainerState::Running || ct.state == ContainerState::Paused;
            ct.exit_status = status;
            ct.set_prop(Prop::ExitStatus);
            ct.oom_killed = oom_killed;
            ct.set_prop(Prop::OomKilled);
            if oom_killed {
                ct.oom_events += 1;
            }
            ct.death_time = now_ms();
            ct.set_prop(Prop::DeathTime);
            ct.set_state(ContainerState::Dead);
        }
        if was_running {
            self.update_running_children(&ct_ref, -1);
        }
        Ok(())
    }

    /// Return a dead or alive container to `Stopped`.
    pub fn stop(&self, name: &str) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        let was_running;
        {
            let mut ct = ct_ref.write();
            if ct.state == ContainerState::Stopped {
                return Err(SteinError::invalid_state(format!(
                    "Container already stopped: {name}"
                )));
            }
            was_running = ct.state == ContainerState::Running || ct.state == ContainerState::Paused;
            ct.task_pid = 0;
            ct.task_vpid = 0;
            ct.wait_task_pid = 0;
            ct.seize_task_pid = 0;
            ct.clear_prop(Prop::RootPid);
            ct.clear_prop(Prop::StartTime);
            ct.clear_prop(Prop::DeathTime);
            ct.set_state(ContainerState::Stopped);
        }
        if was_running {
            self.update_running_children(&ct_ref, -1);
        }
        Ok(())
    }

    /// Freeze a running container.
    pub fn pause(&self, name: &str) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        let mut ct = ct_ref.write();
        if !ct.state.can_pause() {
            return Err(SteinError::invalid_state(format!(
                "Cannot pause container in state {}",
                ct.state
            )));
        }
        ct.set_state(ContainerState::Paused);
        Ok(())
    }

    /// Thaw a paused container.
    pub fn resume(&self, name: &str) -> SteinResult<()> {
        let ct_ref = self.find(name)?;
        let mut ct = ct_ref.write();
        if !ct.state.can_resume() {
            return Err(SteinError::invalid_state(format!(
                "Cannot resume container in state {}",
                ct.state
            )));
        }
        ct.set_state(ContainerState::Running);
        Ok(())
    }

    /// Whether the daemon should respawn the dead task.
    pub fn may_respawn(&self, name: &str) -> SteinResult<bool> {
        let ct_ref = self.find(name)?;
        let ct = ct_ref.read();
        Ok(ct.state == ContainerState::Dead
            && ct.to_respawn
            && (ct.max_respawns < 0 || ct.respawn_count < ct.max_respawns as u64))
    }

    /// Dead containers whose aging time has elapsed.
    #[must_use]
    pub fn expired_dead(&self, now: u64) -> Vec<String> {
        self.index
            .read()
            .iter()
            .filter(|(_, ct)| {
                let ct = ct.read();
                ct.state == ContainerState::Dead
                    && now >= ct.death_time.saturating_add(ct.aging_time)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Containers flagged for destruction on client disconnect.
    #[must_use]
    pub fn weak_containers(&self) -> Vec<String> {
        self.index
            .read()
            .iter()
            .filter(|(_, ct)| ct.read().is_weak)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn update_running_children(&self, ct: &ContainerRef, diff: i64) {
        let mut cursor = ct.read().parent.clone();
        while let Some(parent) = cursor.upgrade() {
            let mut parent = parent.write();
            parent.running_children = parent.running_children.saturating_add_signed(diff);
            cursor = parent.parent.clone();
        }
    }
}

impl Default for ContainerTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_find() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::new(1000, 1000), true).unwrap();
        tree.create("a/b", Cred::new(1000, 1000), true).unwrap();

        assert_eq!(tree.len(), 2);
        let child = tree.find("a/b").unwrap();
        let parent = child.read().parent.upgrade().unwrap();
        assert_eq!(parent.read().name, "a");

        assert!(tree.find("missing").is_err());
        assert!(tree.create("a", Cred::new(1000, 1000), true).is_err());
        assert!(tree.create("x/y", Cred::new(1000, 1000), true).is_err());
    }

    #[test]
    fn name_validation() {
        let tree = ContainerTree::new();
        assert!(tree.create("ok-name_1.x", Cred::root(), true).is_ok());
        assert!(tree.create("", Cred::root(), true).is_err());
        assert!(tree.create("bad name", Cred::root(), true).is_err());
        assert!(tree.create("bad//name", Cred::root(), true).is_err());
        assert!(tree.create(&"x".repeat(200), Cred::root(), true).is_err());
    }

    #[test]
    fn destroy_removes_subtree() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();
        tree.create("a/b", Cred::root(), true).unwrap();
        tree.create("a/b/c", Cred::root(), true).unwrap();
        tree.create("ab", Cred::root(), true).unwrap();

        tree.destroy("a/b").unwrap();
        assert!(tree.find("a/b").is_err());
        assert!(tree.find("a/b/c").is_err());
        assert!(tree.find("a").is_ok());
        assert!(tree.find("ab").is_ok());
        assert_eq!(tree.root().read().children.len(), 2);
    }

    #[test]
    fn lifecycle_happy_path() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();
        tree.find("a").unwrap().write().command = "/bin/true".into();

        tree.start("a").unwrap();
        assert_eq!(tree.find("a").unwrap().read().state, ContainerState::Starting);

        tree.started("a", 100, 1, 99).unwrap();
        {
            let ct_ref = tree.find("a").unwrap();
            let ct = ct_ref.read();
            assert_eq!(ct.state, ContainerState::Running);
            assert_eq!(ct.task_pid, 100);
            assert!(ct.start_time > 0);
        }
        assert_eq!(tree.root().read().running_children, 1);

        tree.pause("a").unwrap();
        tree.resume("a").unwrap();

        tree.exit("a", 0x8b, false).unwrap();
        {
            let ct_ref = tree.find("a").unwrap();
            let ct = ct_ref.read();
            assert_eq!(ct.state, ContainerState::Dead);
            assert_eq!(ct.exit_code(), -11);
            assert!(ct.death_time > 0);
        }
        assert_eq!(tree.root().read().running_children, 0);

        tree.stop("a").unwrap();
        assert_eq!(tree.find("a").unwrap().read().state, ContainerState::Stopped);
    }

    #[test]
    fn start_requires_command_and_stopped_state() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();

        let err = tree.start("a").unwrap_err();
        assert!(err.is_invalid_value());

        tree.find("a").unwrap().write().command = "/bin/true".into();
        tree.start("a").unwrap();
        let err = tree.start("a").unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn start_under_paused_parent_fails() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();
        tree.create("a/b", Cred::root(), true).unwrap();
        tree.find("a").unwrap().write().command = "/bin/sleep 1".into();
        tree.find("a/b").unwrap().write().command = "/bin/true".into();

        tree.start("a").unwrap();
        tree.started("a", 10, 1, 9).unwrap();
        tree.pause("a").unwrap();

        assert!(tree.start("a/b").unwrap_err().is_invalid_state());
    }

    #[test]
    fn respawn_budget() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();
        {
            let ct_ref = tree.find("a").unwrap();
            let mut ct = ct_ref.write();
            ct.command = "/bin/true".into();
            ct.to_respawn = true;
            ct.max_respawns = 2;
        }
        tree.start("a").unwrap();
        tree.started("a", 10, 1, 9).unwrap();
        tree.exit("a", 0, false).unwrap();
        assert!(tree.may_respawn("a").unwrap());

        tree.find("a").unwrap().write().respawn_count = 2;
        assert!(!tree.may_respawn("a").unwrap());
    }

    #[test]
    fn aging_and_weak_listings() {
        let tree = ContainerTree::new();
        tree.create("a", Cred::root(), true).unwrap();
        {
            let ct_ref = tree.find("a").unwrap();
            let mut ct = ct_ref.write();
            ct.command = "/bin/true".into();
            ct.aging_time = 1000;
            ct.is_weak = true;
        }
        tree.start("a").unwrap();
        tree.started("a", 10, 1, 9).unwrap();
        tree.exit("a", 0, false).unwrap();

        let death = tree.find("a").unwrap().read().death_time;
        assert!(tree.expired_dead(death + 500).is_empty());
        assert_eq!(tree.expired_dead(death + 1500), vec!["a".to_string()]);
        assert_eq!(tree.weak_containers(), vec!["a".to_string()]);
    }
}
