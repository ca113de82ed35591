//! The binary's own host surface

use keel_host::manifest::{DeclaredMethod, DeclaredType, Marker, MenuEventMarker, MenuItemKind, MenuMarker};
use keel_host::startup::HostSurface;

/// Menu identifier of the host's top-level menu
pub const MENU_ROOT: &str = "keel";
/// Menu identifier of the reload entry
pub const MENU_RELOAD: &str = "keel.reload";

/// Menus and menu events declared by the keel host itself
pub fn host_surface() -> HostSurface {
    let root = MenuMarker {
        item: MenuItemKind::Popup,
        position: Some(99),
        ..MenuMarker::new(MENU_ROOT, "Keel")
    };
    let reload = MenuMarker {
        parent_id: Some(MENU_ROOT.to_string()),
        ..MenuMarker::new(MENU_RELOAD, "Reload extensions")
    };

    HostSurface::new("keel").with_type(
        DeclaredType::new("HostMenu")
            .with_marker(Marker::Menu(root))
            .with_marker(Marker::Menu(reload))
            .with_method(
                DeclaredMethod::new("reload_extensions")
                    .with_marker(Marker::MenuEvent(MenuEventMarker::new(MENU_RELOAD))),
            ),
    )
}
