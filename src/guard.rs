//! Decides whether an installation may be deleted.

use crate::ecosystem::{is_strictly_inside, EcosystemLayout};
use crate::models::{InstalledVersion, Provenance};

/// Why an installation cannot be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Active,
    SystemOwned,
    Reserved,
    OutsideCellar,
    OutsideVersionManager,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::Active => "it is the active version; switch to another version first",
            Rejection::SystemOwned => "it is not owned by a package manager or version manager",
            Rejection::Reserved => "it lives under a reserved system path",
            Rejection::OutsideCellar => "its path is not inside a package manager cellar",
            Rejection::OutsideVersionManager => {
                "its path is not inside the owning version manager's directory"
            }
        }
    }
}

/// First rule that forbids removing `candidate`, if any
pub fn check(
    layout: &EcosystemLayout,
    candidate: &InstalledVersion,
    active: Option<&InstalledVersion>,
) -> Option<Rejection> {
    if active.is_some_and(|a| a.is_same_installation(candidate)) {
        return Some(Rejection::Active);
    }

    match candidate.provenance {
        Provenance::System => Some(Rejection::SystemOwned),
        _ if layout.is_reserved(&candidate.install_root) => Some(Rejection::Reserved),
        Provenance::PackageManager => layout
            .owning_cellar(&candidate.install_root)
            .is_none()
            .then_some(Rejection::OutsideCellar),
        Provenance::VersionManager(slot) => {
            let inside = layout
                .version_manager(slot)
                .is_some_and(|vm| is_strictly_inside(&candidate.install_root, &vm.root));
            (!inside).then_some(Rejection::OutsideVersionManager)
        }
    }
}

pub fn can_uninstall(
    layout: &EcosystemLayout,
    candidate: &InstalledVersion,
    active: Option<&InstalledVersion>,
) -> bool {
    check(layout, candidate, active).is_none()
}
