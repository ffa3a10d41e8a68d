use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Optional configuration file: --config <path> or --config=<path>.
    // Defaults to ./diagnostico.toml when present.
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| {
            args.iter()
                .find_map(|a| a.strip_prefix("--config=").map(str::to_string))
        })
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    // Non-interactive TUI smoke test mode (for automated checks).
    // Renders a single frame for a specific page and exits 0.
    // Usage: --tui-smoke or --tui-smoke=intake|welcome|questionnaire|phase|idle|exit|loading|confirmation
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--tui-smoke" || a.starts_with("--tui-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        sst_diagnosis::run_tui_smoke(target, config_path);
        return;
    }

    sst_diagnosis::run_tui(config_path);
}
