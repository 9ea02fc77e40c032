//! The container property engine: a fixed registry of named, typed,
//! guarded attributes with uniform get/set/indexed/persist operations.

mod caps;
mod cgroups;
mod cpu;
mod exec;
mod fs;
mod io;
mod lifecycle;
mod memory;
mod net;
mod raw;
mod runtime;
mod stream;

use std::collections::BTreeMap;

use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::client::ClientSession;
use crate::container::{Container, ContainerRef, ContainerState, Prop};
use crate::host::Host;
use crate::tree::ContainerTree;

/// Ambient context of one property operation.
///
/// The target container is held write-locked for the whole operation; the
/// client and host collaborators are read-only. `restoring` neutralises
/// state and permission guards and is set only by [`Engine::restore`].
pub struct PropCtx<'a> {
    /// The write-locked target record.
    pub ct: &'a mut Container,
    /// The target's shared handle, for staged tree walks.
    pub handle: &'a ContainerRef,
    /// The whole tree, for cross-container checks.
    pub tree: &'a ContainerTree,
    /// The requesting principal.
    pub client: &'a dyn ClientSession,
    /// Host collaborators and tunables.
    pub host: &'a Host,
    /// Guard bypass used while replaying persisted values.
    pub restoring: bool,
}

impl PropCtx<'_> {
    /// Mutation guard: configuration properties, only before start.
    pub fn alive_and_stopped(&self) -> SteinResult<()> {
        if self.restoring {
            return Ok(());
        }
        match self.ct.state {
            ContainerState::Dead => Err(SteinError::invalid_state(
                "Cannot change property while in the dead state",
            )),
            ContainerState::Stopped => Ok(()),
            _ => Err(SteinError::invalid_state(
                "Cannot change property in runtime",
            )),
        }
    }

    /// Mutation guard: dynamic properties, any state but dead.
    pub fn alive(&self) -> SteinResult<()> {
        if self.restoring {
            return Ok(());
        }
        if self.ct.state == ContainerState::Dead {
            Err(SteinError::invalid_state(
                "Cannot change property while in the dead state",
            ))
        } else {
            Ok(())
        }
    }

    /// Read guard: runtime observables, unavailable while stopped.
    pub fn runtime_readable(&self, name: &str) -> SteinResult<()> {
        if self.restoring {
            return Ok(());
        }
        if self.ct.state == ContainerState::Stopped {
            Err(SteinError::invalid_state(format!(
                "Not available in stopped state: {name}"
            )))
        } else {
            Ok(())
        }
    }

    /// Read guard: post-mortem observables.
    pub fn dead_readable(&self, name: &str) -> SteinResult<()> {
        if self.restoring {
            return Ok(());
        }
        if self.ct.state != ContainerState::Dead {
            Err(SteinError::invalid_state(format!(
                "Available only in dead state: {name}"
            )))
        } else {
            Ok(())
        }
    }

    /// Request cgroup controllers for the container.
    ///
    /// While stopped the mask is folded into both the active and the
    /// required set; past that point the controller set is frozen and new
    /// bits are refused.
    pub fn want_controllers(&mut self, mask: Controllers) -> SteinResult<()> {
        if self.ct.state == ContainerState::Stopped || self.restoring {
            self.ct.controllers |= mask;
            self.ct.required_controllers |= mask;
            Ok(())
        } else if !self.ct.controllers.contains(mask) {
            Err(SteinError::not_supported(
                "Cannot enable controllers at runtime",
            ))
        } else {
            Ok(())
        }
    }
}

/// One named container property.
///
/// Implementations are stateless unit structs registered once in catalogue
/// order; all state lives in the container record reached through the
/// context.
pub trait Property: Send + Sync {
    /// Unique client-facing name.
    fn name(&self) -> &'static str;

    /// Human description.
    fn desc(&self) -> &'static str;

    /// Presence bit; `Some` also opts the property into persistence under
    /// its own name.
    fn prop(&self) -> Option<Prop> {
        None
    }

    /// Clients cannot set the value.
    fn read_only(&self) -> bool {
        false
    }

    /// Hidden from property listings.
    fn hidden(&self) -> bool {
        false
    }

    /// Supports `get_indexed`/`set_indexed`.
    fn indexable(&self) -> bool {
        false
    }

    /// Whether the host kernel supports the property at all.
    fn supported(&self, host: &Host) -> bool {
        let _ = host;
        true
    }

    /// Read the value.
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String>;

    /// Write the value.
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        let _ = (ctx, value);
        if self.read_only() {
            Err(SteinError::invalid_value(format!(
                "Read-only value: {}",
                self.name()
            )))
        } else {
            Err(SteinError::not_supported(format!(
                "Not implemented: {}",
                self.name()
            )))
        }
    }

    /// Read one element of an indexable property.
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let _ = (ctx, index);
        Err(SteinError::invalid_value("Invalid subscript for property"))
    }

    /// Write one element of an indexable property.
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        let _ = (ctx, index, value);
        Err(SteinError::invalid_value("Invalid subscript for property"))
    }

    /// Serialized form for the persistent snapshot.
    fn save(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        if self.prop().is_some() {
            self.get(ctx)
        } else {
            Err(SteinError::unknown(format!(
                "Trying to save non-serializable value: {}",
                self.name()
            )))
        }
    }

    /// Replay a persisted value; guards are bypassed by the caller.
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        if self.prop().is_some() {
            self.set(ctx, value)
        } else {
            Err(SteinError::unknown(format!(
                "Trying to restore non-serializable value: {}",
                self.name()
            )))
        }
    }
}

/// The fixed, ordered set of all container properties.
pub struct Registry {
    props: Vec<&'static dyn Property>,
    index: BTreeMap<&'static str, usize>,
}

impl Registry {
    /// Build the full catalogue in its stable order.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            props: Vec::new(),
            index: BTreeMap::new(),
        };
        fs::register(&mut registry);
        exec::register(&mut registry);
        caps::register(&mut registry);
        cpu::register(&mut registry);
        memory::register(&mut registry);
        io::register(&mut registry);
        net::register(&mut registry);
        stream::register(&mut registry);
        lifecycle::register(&mut registry);
        cgroups::register(&mut registry);
        runtime::register(&mut registry);
        raw::register(&mut registry);
        registry
    }

    /// Register one property; names must be unique.
    pub fn add(&mut self, prop: &'static dyn Property) {
        let previous = self.index.insert(prop.name(), self.props.len());
        debug_assert!(previous.is_none(), "duplicate property {}", prop.name());
        self.props.push(prop);
    }

    /// Look a property up by name.
    pub fn find(&self, name: &str) -> SteinResult<&'static dyn Property> {
        self.index
            .get(name)
            .map(|&i| self.props[i])
            .ok_or_else(|| SteinError::invalid_property(format!("Unknown property: {name}")))
    }

    /// Properties in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Property> + '_ {
        self.props.iter().copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `name[index]` into the property name and optional subscript.
fn parse_property_spec(spec: &str) -> SteinResult<(&str, Option<&str>)> {
    match spec.find('[') {
        None => Ok((spec, None)),
        Some(open) => {
            let close = spec
                .rfind(']')
                .filter(|&close| close > open)
                .ok_or_else(|| {
                    SteinError::invalid_property(format!("Invalid property subscript: {spec}"))
                })?;
            Ok((&spec[..open], Some(&spec[open + 1..close])))
        }
    }
}

/// The engine facade: registry plus the entry points the RPC layer calls.
pub struct Engine {
    registry: Registry,
}

impl Engine {
    /// Build an engine with the full property catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Visible, host-supported property names in registry order.
    #[must_use]
    pub fn list_properties(&self, host: &Host) -> Vec<&'static str> {
        self.registry
            .iter()
            .filter(|p| !p.hidden() && p.supported(host))
            .map(Property::name)
            .collect()
    }

    /// Read a property; `spec` may carry a `[subscript]`.
    pub fn get(
        &self,
        tree: &ContainerTree,
        host: &Host,
        client: &dyn ClientSession,
        container: &str,
        spec: &str,
    ) -> SteinResult<String> {
        let (name, index) = parse_property_spec(spec)?;
        let prop = self.registry.find(name)?;
        if !prop.supported(host) {
            return Err(SteinError::not_supported(format!(
                "Not supported on this host: {name}"
            )));
        }

        let handle = tree.find(container)?;
        let mut guard = handle.write();
        let mut ctx = PropCtx {
            ct: &mut *guard,
            handle: &handle,
            tree,
            client,
            host,
            restoring: false,
        };
        match index {
            Some(index) => prop.get_indexed(&mut ctx, index),
            None => prop.get(&mut ctx),
        }
    }

    /// Write a property; `spec` may carry a `[subscript]`.
    pub fn set(
        &self,
        tree: &ContainerTree,
        host: &Host,
        client: &dyn ClientSession,
        container: &str,
        spec: &str,
        value: &str,
    ) -> SteinResult<()> {
        let (name, index) = parse_property_spec(spec)?;
        let prop = self.registry.find(name)?;
        if !prop.supported(host) {
            return Err(SteinError::not_supported(format!(
                "Not supported on this host: {name}"
            )));
        }

        let handle = tree.find(container)?;
        let mut guard = handle.write();
        client.can_control(&guard.owner_cred)?;

        let mut ctx = PropCtx {
            ct: &mut *guard,
            handle: &handle,
            tree,
            client,
            host,
            restoring: false,
        };
        let result = match index {
            Some(index) => prop.set_indexed(&mut ctx, index, value),
            None => prop.set(&mut ctx, value),
        };
        if let Err(err) = &result {
            tracing::debug!(container = %guard.name, property = name, %err,
                            "property set rejected");
        }
        result
    }

    /// Serialize every explicitly-set persistable property in registry
    /// order.
    pub fn save(
        &self,
        tree: &ContainerTree,
        host: &Host,
        client: &dyn ClientSession,
        container: &str,
    ) -> SteinResult<Vec<(String, String)>> {
        let handle = tree.find(container)?;
        let mut guard = handle.write();
        let mut out = Vec::new();
        for prop in self.registry.iter() {
            let Some(bit) = prop.prop() else { continue };
            if !guard.has_prop(bit) {
                continue;
            }
            let mut ctx = PropCtx {
                ct: &mut *guard,
                handle: &handle,
                tree,
                client,
                host,
                restoring: false,
            };
            let value = prop.save(&mut ctx)?;
            out.push((prop.name().to_string(), value));
        }
        Ok(out)
    }

    /// Replay a persisted snapshot, bypassing state and permission guards.
    ///
    /// Values apply in registry order; unknown keys are logged and skipped
    /// so snapshots from newer daemons degrade gracefully.
    pub fn restore(
        &self,
        tree: &ContainerTree,
        host: &Host,
        client: &dyn ClientSession,
        container: &str,
        entries: &[(String, String)],
    ) -> SteinResult<()> {
        let map: BTreeMap<&str, &str> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for key in map.keys() {
            if self.registry.find(key).is_err() {
                tracing::warn!(container, key = %key, "skipping unknown persisted property");
            }
        }

        let handle = tree.find(container)?;
        let mut guard = handle.write();
        for prop in self.registry.iter() {
            if prop.prop().is_none() {
                continue;
            }
            let Some(value) = map.get(prop.name()) else {
                continue;
            };
            let mut ctx = PropCtx {
                ct: &mut *guard,
                handle: &handle,
                tree,
                client,
                host,
                restoring: true,
            };
            prop.restore(&mut ctx, value)?;
        }
        guard.sanitize_capabilities(host.info.has_ambient_caps);
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_spec_parsing() {
        assert_eq!(parse_property_spec("env").unwrap(), ("env", None));
        assert_eq!(
            parse_property_spec("env[PATH]").unwrap(),
            ("env", Some("PATH"))
        );
        assert_eq!(
            parse_property_spec("stdout[10:200]").unwrap(),
            ("stdout", Some("10:200"))
        );
        assert!(parse_property_spec("env[PATH").is_err());
    }

    #[test]
    fn registry_has_unique_names_in_stable_order() {
        let registry = Registry::new();
        let names: Vec<_> = registry.iter().map(Property::name).collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());

        // the catalogue starts with the filesystem group
        assert_eq!(names[0], "cwd");
        assert!(registry.find("memory_limit").is_ok());
        assert!(registry.find("no_such_prop").is_err());
    }
}
