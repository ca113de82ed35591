//! Startup marker processor
//!
//! Scans the host application's own surface for menu and menu-event markers.
//! Menu events are registered with the dispatcher one by one as they are
//! found; menus are handed to the UI collaborator as one batch after the whole
//! surface has been scanned.

use crate::manifest::{DeclaredType, Marker, MenuEventMarker, MenuMarker};
use serde::Serialize;
use tracing::{debug, error, info};

/// Types declared by the host application itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSurface {
    pub name: String,
    pub types: Vec<DeclaredType>,
}

impl HostSurface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: DeclaredType) -> Self {
        self.types.push(ty);
        self
    }
}

/// Menu marker with its originating type attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuDescriptor {
    pub menu: MenuMarker,
    pub origin_type: String,
}

/// Menu event marker with its originating type and method attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEventDescriptor {
    pub event: MenuEventMarker,
    pub origin_type: String,
    pub origin_method: Option<String>,
}

impl MenuEventDescriptor {
    /// Handler to invoke: the declared selector, else the annotated method
    pub fn handler(&self) -> Option<&str> {
        self.event
            .handler
            .as_deref()
            .or(self.origin_method.as_deref())
    }
}

/// Event-dispatch collaborator
pub trait MenuEventDispatcher: Send + Sync {
    fn register_menu_event(&self, descriptor: MenuEventDescriptor) -> anyhow::Result<()>;
}

/// UI collaborator building menus in one pass
pub trait MenuBuilder: Send + Sync {
    fn process_menus(&self, menus: Vec<MenuDescriptor>) -> anyhow::Result<()>;
}

/// Counts of what the startup scan handed to the collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub menus: usize,
    pub menu_events: usize,
}

/// Scan the host surface and register its menus and menu events
///
/// Never fails: any error aborts the scan, is logged, and an empty report is
/// returned so the host keeps running without menus.
pub fn process_host_startup(
    surface: &HostSurface,
    dispatcher: &dyn MenuEventDispatcher,
    menus: &dyn MenuBuilder,
) -> StartupReport {
    info!("Configuring host application: {}", surface.name);
    match scan_surface(surface, dispatcher, menus) {
        Ok(report) => {
            info!(
                "Host startup registered {} menus and {} menu events",
                report.menus, report.menu_events
            );
            report
        }
        Err(e) => {
            error!("Failed to process host startup markers: {:#}", e);
            StartupReport::default()
        }
    }
}

fn scan_surface(
    surface: &HostSurface,
    dispatcher: &dyn MenuEventDispatcher,
    menus: &dyn MenuBuilder,
) -> anyhow::Result<StartupReport> {
    let mut batch = Vec::new();
    let mut menu_events = 0;

    for ty in &surface.types {
        let type_markers = ty.markers.iter().map(|m| (m, None));
        let method_markers = ty
            .methods
            .iter()
            .flat_map(|method| method.markers.iter().map(move |m| (m, Some(&method.name))));

        for (marker, method) in type_markers.chain(method_markers) {
            debug!("Processing marker {:?} on {}", marker, ty.name);
            match marker {
                Marker::MenuEvent(event) => {
                    dispatcher.register_menu_event(MenuEventDescriptor {
                        event: event.clone(),
                        origin_type: ty.name.clone(),
                        origin_method: method.cloned(),
                    })?;
                    menu_events += 1;
                }
                Marker::Menu(menu) => batch.push(MenuDescriptor {
                    menu: menu.clone(),
                    origin_type: ty.name.clone(),
                }),
                Marker::Resource(_) | Marker::Permission(_) | Marker::Unknown => {}
            }
        }
    }

    let report = StartupReport {
        menus: batch.len(),
        menu_events,
    };
    menus.process_menus(batch)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DeclaredMethod;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<MenuEventDescriptor>>,
        batches: Mutex<Vec<Vec<MenuDescriptor>>>,
        fail_on: Option<&'static str>,
    }

    impl MenuEventDispatcher for Recorder {
        fn register_menu_event(&self, descriptor: MenuEventDescriptor) -> anyhow::Result<()> {
            if self.fail_on == Some(descriptor.event.menu_id.as_str()) {
                anyhow::bail!("dispatcher refused {}", descriptor.event.menu_id);
            }
            self.events.lock().unwrap().push(descriptor);
            Ok(())
        }
    }

    impl MenuBuilder for Recorder {
        fn process_menus(&self, menus: Vec<MenuDescriptor>) -> anyhow::Result<()> {
            self.batches.lock().unwrap().push(menus);
            Ok(())
        }
    }

    fn surface() -> HostSurface {
        HostSurface::new("host")
            .with_type(
                DeclaredType::new("MainMenu")
                    .with_marker(Marker::Menu(MenuMarker::new("tools", "Tools")))
                    .with_method(
                        DeclaredMethod::new("on_reload")
                            .with_marker(Marker::MenuEvent(MenuEventMarker::new("tools.reload"))),
                    ),
            )
            .with_type(
                DeclaredType::new("HelpMenu")
                    .with_marker(Marker::Menu(MenuMarker::new("help", "Help")))
                    .with_marker(Marker::MenuEvent(MenuEventMarker {
                        menu_id: "help.about".into(),
                        handler: Some("show_about".into()),
                    }))
                    .with_marker(Marker::Unknown),
            )
    }

    #[test]
    fn test_menus_forwarded_as_single_batch() {
        let recorder = Recorder::default();
        let report = process_host_startup(&surface(), &recorder, &recorder);

        assert_eq!(report, StartupReport { menus: 2, menu_events: 2 });
        let batches = recorder.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let origins: Vec<_> = batches[0].iter().map(|m| m.origin_type.as_str()).collect();
        assert_eq!(origins, vec!["MainMenu", "HelpMenu"]);
    }

    #[test]
    fn test_menu_events_carry_origin() {
        let recorder = Recorder::default();
        process_host_startup(&surface(), &recorder, &recorder);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events[0].origin_type, "MainMenu");
        assert_eq!(events[0].origin_method.as_deref(), Some("on_reload"));
        assert_eq!(events[0].handler(), Some("on_reload"));
        assert_eq!(events[1].origin_method, None);
        assert_eq!(events[1].handler(), Some("show_about"));
    }

    #[test]
    fn test_failure_is_contained() {
        let recorder = Recorder {
            fail_on: Some("tools.reload"),
            ..Default::default()
        };
        let report = process_host_startup(&surface(), &recorder, &recorder);

        assert_eq!(report, StartupReport::default());
        assert!(recorder.batches.lock().unwrap().is_empty());
    }
}
