#[cfg(feature = "desktop")]
const COMMANDS: &[&str] = &[
    "start_call",
    "end_call",
    "call_state",
    "set_audio_enabled",
    "set_video_enabled",
];

fn main() {
    #[cfg(feature = "desktop")]
    tauri_plugin::Builder::new(COMMANDS).build();
}
