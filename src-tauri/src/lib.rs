pub mod algorithm;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod geocode;
pub mod location;
pub mod models;
pub mod session;
pub mod style;

#[cfg(feature = "desktop")]
pub fn run() {
    use commands::map::{start_map_session, MapState};
    use tauri::Manager;

    env_logger::init();

    let config = config::AppConfig::load();

    tauri::Builder::default()
        .setup(move |app| {
            let state = start_map_session(app.handle().clone(), config);
            app.manage(state);
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event {
                if let Some(state) = window.try_state::<MapState>() {
                    log::info!("window destroyed, closing map session {}", state.session.id());
                    state.session.close();
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::map::map_event,
            commands::map::toggle_follow,
            commands::map::report_location,
            commands::map::report_location_error,
            commands::map::report_orientation,
            commands::map::get_current_location,
            commands::map::get_map_snapshot,
            commands::map::load_map_style,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
