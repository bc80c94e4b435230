use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

/// A kind of Linux namespace that can be entered through a pidfd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Cgroup,
    Ipc,
    Network,
    Mount,
    Pid,
    User,
    Uts,
}

impl Namespace {
    /// Every namespace kind, in the order they are displayed.
    pub const ALL: [Namespace; 7] = [
        Namespace::Cgroup,
        Namespace::Ipc,
        Namespace::Network,
        Namespace::Mount,
        Namespace::Pid,
        Namespace::User,
        Namespace::Uts,
    ];

    /// The `CLONE_NEW*` flag for this namespace.
    pub fn clone_flag(self) -> c_int {
        match self {
            Namespace::Cgroup => libc::CLONE_NEWCGROUP,
            Namespace::Ipc => libc::CLONE_NEWIPC,
            Namespace::Network => libc::CLONE_NEWNET,
            Namespace::Mount => libc::CLONE_NEWNS,
            Namespace::Pid => libc::CLONE_NEWPID,
            Namespace::User => libc::CLONE_NEWUSER,
            Namespace::Uts => libc::CLONE_NEWUTS,
        }
    }

    /// The name of the namespace's file in `/proc/PID/ns`.
    pub fn proc_name(self) -> &'static str {
        match self {
            Namespace::Cgroup => "cgroup",
            Namespace::Ipc => "ipc",
            Namespace::Network => "net",
            Namespace::Mount => "mnt",
            Namespace::Pid => "pid",
            Namespace::User => "user",
            Namespace::Uts => "uts",
        }
    }
}

impl FromStr for Namespace {
    type Err = ParseNamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cgroup" => Ok(Namespace::Cgroup),
            "ipc" => Ok(Namespace::Ipc),
            "net" | "network" => Ok(Namespace::Network),
            "mnt" | "mount" => Ok(Namespace::Mount),
            "pid" => Ok(Namespace::Pid),
            "user" => Ok(Namespace::User),
            "uts" => Ok(Namespace::Uts),
            other => Err(ParseNamespaceError::UnknownKind(other.to_owned())),
        }
    }
}

/// Bitset of namespaces to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamespaceSet {
    pub cgroup: bool,
    pub ipc: bool,
    pub network: bool,
    pub mount: bool,
    pub pid: bool,
    pub user: bool,
    pub uts: bool,
}

impl NamespaceSet {
    /// Only the network namespace.
    pub const NETWORK: NamespaceSet = NamespaceSet {
        cgroup: false,
        ipc: false,
        network: true,
        mount: false,
        pid: false,
        user: false,
        uts: false,
    };

    /// Everything needed to look like a process of the target container: network, pid, mount,
    /// cgroup and uts. IPC and user namespaces are left alone.
    pub const CONTAINER: NamespaceSet = NamespaceSet {
        cgroup: true,
        ipc: false,
        network: true,
        mount: true,
        pid: true,
        user: false,
        uts: true,
    };

    /// The set used when none is configured. `CONTAINER`, unless built with `network-only`.
    #[cfg(not(feature = "network-only"))]
    pub const DEFAULT: NamespaceSet = NamespaceSet::CONTAINER;

    /// The set used when none is configured. `CONTAINER`, unless built with `network-only`.
    #[cfg(feature = "network-only")]
    pub const DEFAULT: NamespaceSet = NamespaceSet::NETWORK;

    /// An empty set.
    pub fn new() -> NamespaceSet {
        NamespaceSet::default()
    }

    /// Add a namespace to the set.
    pub fn insert(&mut self, namespace: Namespace) -> &mut NamespaceSet {
        *self.slot(namespace) = true;
        self
    }

    pub fn contains(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::Cgroup => self.cgroup,
            Namespace::Ipc => self.ipc,
            Namespace::Network => self.network,
            Namespace::Mount => self.mount,
            Namespace::Pid => self.pid,
            Namespace::User => self.user,
            Namespace::Uts => self.uts,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == NamespaceSet::default()
    }

    /// Iterate over the namespaces in the set.
    pub fn iter(&self) -> impl Iterator<Item = Namespace> + '_ {
        Namespace::ALL.into_iter().filter(move |ns| self.contains(*ns))
    }

    /// The `nstype` mask to pass to `setns(2)`.
    pub fn clone_flags(&self) -> c_int {
        self.iter().fold(0, |flags, ns| flags | ns.clone_flag())
    }

    fn slot(&mut self, namespace: Namespace) -> &mut bool {
        match namespace {
            Namespace::Cgroup => &mut self.cgroup,
            Namespace::Ipc => &mut self.ipc,
            Namespace::Network => &mut self.network,
            Namespace::Mount => &mut self.mount,
            Namespace::Pid => &mut self.pid,
            Namespace::User => &mut self.user,
            Namespace::Uts => &mut self.uts,
        }
    }
}

impl FromIterator<Namespace> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = Namespace>>(iter: I) -> Self {
        let mut set = NamespaceSet::new();
        for ns in iter {
            set.insert(ns);
        }
        set
    }
}

impl fmt::Display for NamespaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ns) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(ns.proc_name())?;
        }
        Ok(())
    }
}

/// Parse a preset name (`network`, `container`) or a comma-separated list of namespace kinds.
impl FromStr for NamespaceSet {
    type Err = ParseNamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" | "network-only" => return Ok(NamespaceSet::NETWORK),
            "container" => return Ok(NamespaceSet::CONTAINER),
            _ => {}
        }

        let set = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Namespace::from_str)
            .collect::<Result<NamespaceSet, _>>()?;
        if set.is_empty() {
            return Err(ParseNamespaceError::Empty);
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNamespaceError {
    #[error("unknown namespace kind {0:?} (expected one of cgroup, ipc, net, mnt, pid, user, uts)")]
    UnknownKind(String),

    #[error("namespace set is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_preset_is_net_only() {
        assert_eq!(NamespaceSet::NETWORK.clone_flags(), libc::CLONE_NEWNET);
    }

    #[test]
    fn container_preset_flags() {
        let expected = libc::CLONE_NEWNET
            | libc::CLONE_NEWPID
            | libc::CLONE_NEWNS
            | libc::CLONE_NEWCGROUP
            | libc::CLONE_NEWUTS;
        assert_eq!(NamespaceSet::CONTAINER.clone_flags(), expected);
        assert!(!NamespaceSet::CONTAINER.contains(Namespace::User));
        assert!(!NamespaceSet::CONTAINER.contains(Namespace::Ipc));
    }

    #[test]
    fn parse_presets() {
        assert_eq!("network".parse::<NamespaceSet>(), Ok(NamespaceSet::NETWORK));
        assert_eq!("container".parse::<NamespaceSet>(), Ok(NamespaceSet::CONTAINER));
    }

    #[test]
    fn parse_list_accepts_short_and_long_names() {
        let set: NamespaceSet = "net, mount,ipc".parse().unwrap();
        assert!(set.network && set.mount && set.ipc);
        assert!(!set.pid && !set.user && !set.uts && !set.cgroup);
    }

    #[test]
    fn parse_rejects_unknown_and_empty() {
        assert_eq!(
            "net,time".parse::<NamespaceSet>(),
            Err(ParseNamespaceError::UnknownKind("time".into()))
        );
        assert_eq!(",".parse::<NamespaceSet>(), Err(ParseNamespaceError::Empty));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let shown = NamespaceSet::CONTAINER.to_string();
        assert_eq!(shown, "cgroup,net,mnt,pid,uts");
        assert_eq!(shown.parse::<NamespaceSet>(), Ok(NamespaceSet::CONTAINER));
    }

    #[test]
    fn empty_set_has_no_flags() {
        assert!(NamespaceSet::new().is_empty());
        assert_eq!(NamespaceSet::new().clone_flags(), 0);
    }
}
