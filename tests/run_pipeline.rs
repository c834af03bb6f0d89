// tests/run_pipeline.rs
//
// Settings files on disk -> orchestrator -> execution wrapper -> panel.

#![cfg(unix)]

use opensees_run::core::{
    config_loader::{self, SettingsSources},
    execution::{ExecState, FinishHook, OutputCapture},
    orchestrator::{MP, PanelFactory, RunCommand, SEQUENTIAL},
    workspace::TerminalWorkspace,
};
use opensees_run::system::panel::{MemoryPanel, OutputPanel};
use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::{TempDir, tempdir};

struct Fixture {
    _root: TempDir,
    package_dir: PathBuf,
    bin_dir: PathBuf,
    model: PathBuf,
}

fn fixture() -> Fixture {
    let root = tempdir().expect("temp dir");
    let package_dir = root.path().join("package");
    let bin_dir = root.path().join("bin");
    let models = root.path().join("models");
    for dir in [&package_dir, &bin_dir, &models] {
        fs::create_dir_all(dir).expect("create dir");
    }

    let model = models.join("cantilever.tcl");
    fs::write(&model, "wipe\nmodel BasicBuilder -ndm 2 -ndf 3\n").expect("write model");

    fake_binary(
        &bin_dir,
        "OpenSees",
        "echo \"OpenSees running $1\"\necho 'WARNING: no convergence' >&2\necho '    (file \"cantilever.tcl\" line 2)'\nexit 0",
    );
    fake_binary(&bin_dir, "mpiexec", "echo \"mpiexec $*\"");

    Fixture {
        _root: root,
        package_dir,
        bin_dir,
        model,
    }
}

fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn memory_factory(panel: &MemoryPanel) -> PanelFactory<'static> {
    let panel = panel.clone();
    Box::new(move || Box::new(panel.clone()) as Box<dyn OutputPanel>)
}

fn four() -> usize {
    4
}

#[test]
fn test_sequential_run_with_project_settings() {
    // --- Setup ---
    let fx = fixture();
    let models_dir = fx.model.parent().expect("model dir").to_path_buf();
    fs::write(
        models_dir.join("opensees-project.toml"),
        format!(
            "install_dir = \"{}\"\n\n[executable]\nopensees = \"${{install_dir}}/OpenSees\"\n",
            fx.bin_dir.display()
        ),
    )
    .expect("write project settings");

    let settings = config_loader::load_settings_in(&fx.package_dir, &SettingsSources::default(), Some(&models_dir))
        .expect("settings load");
    assert!(fx.package_dir.join("settings.toml").is_file());

    let panel = MemoryPanel::new();
    let capture = OutputCapture::new();
    let hook_calls = Rc::new(Cell::new(0));
    let hook: FinishHook = {
        let hook_calls = Rc::clone(&hook_calls);
        Box::new(move || hook_calls.set(hook_calls.get() + 1))
    };
    let mut workspace = TerminalWorkspace::new().with_active_file(&fx.model);

    // --- Execute ---
    let mut handle = RunCommand::new(&SEQUENTIAL, &settings, &mut workspace, memory_factory(&panel))
        .with_finish_hooks(vec![None, Some(hook)])
        .with_capture(capture.clone())
        .run(&[])
        .expect("no configuration error")
        .expect("run started");
    let outcome = handle.wait().expect("run finishes");

    // --- Assert ---
    assert!(outcome.success());
    assert_eq!(handle.state(), ExecState::Finished);
    assert_eq!(hook_calls.get(), 1);

    let text = panel.text();
    assert!(text.starts_with("[RUN OpenSees Sequential for \"cantilever.tcl\" Started]\n\n"), "{text}");
    assert!(text.contains("OpenSees running cantilever.tcl\n"), "{text}");
    assert!(text.contains("WARNING: no convergence\n"), "{text}");
    assert!(text.contains("\n\n[RUN OpenSees Sequential for \"cantilever.tcl\" Finished in "), "{text}");
    assert_eq!(capture.text(), text);

    let locations = panel.locations();
    assert_eq!(locations.len(), 1);
    let location = locations.first().expect("one location");
    assert_eq!(location.line, 2);
    assert!(location.path.ends_with("cantilever.tcl"));
    assert!(!panel.is_open());
}

#[test]
fn test_parallel_run_goes_through_the_launcher() {
    let fx = fixture();
    let defaults = fx.package_dir.join("custom.json");
    fs::write(
        &defaults,
        format!(
            r#"{{
                "executable": {{ "opensees_mp": {{ "linux": "{bin}/OpenSees", "osx": "{bin}/OpenSees", "windows": "unused" }} }},
                "mpiexec": "{bin}/mpiexec",
                "processor_count": "999"
            }}"#,
            bin = fx.bin_dir.display()
        ),
    )
    .expect("write defaults");
    let sources = SettingsSources {
        defaults: Some(defaults),
        project: None,
    };
    let settings = config_loader::load_settings_in(&fx.package_dir, &sources, None).expect("settings load");
    assert!(!fx.package_dir.join("settings.toml").exists());

    let panel = MemoryPanel::new();
    let mut workspace = TerminalWorkspace::new();
    let mut handle = RunCommand::new(&MP, &settings, &mut workspace, memory_factory(&panel))
        .with_cpu_count(four)
        .run(&[fx.model.clone()])
        .expect("no configuration error")
        .expect("run started");
    handle.wait().expect("run finishes");

    let text = panel.text();
    assert!(
        text.contains(&format!("mpiexec -np 4 {}/OpenSees cantilever.tcl\n", fx.bin_dir.display())),
        "{text}"
    );
}

#[test]
fn test_invalid_input_starts_nothing() {
    let fx = fixture();
    let settings = config_loader::load_settings_in(&fx.package_dir, &SettingsSources::default(), None)
        .expect("settings load");
    let capture = OutputCapture::new();
    let mut workspace = TerminalWorkspace::new();
    let missing = fx.bin_dir.join("missing.tcl");

    let result = RunCommand::new(&SEQUENTIAL, &settings, &mut workspace, memory_factory(&MemoryPanel::new()))
        .with_capture(capture.clone())
        .run(&[missing.clone()])
        .expect("no configuration error");

    assert!(result.is_none());
    let lines: Vec<String> = capture
        .text()
        .lines()
        .filter(|line| line.contains("is not a valid"))
        .map(str::to_string)
        .collect();
    assert_eq!(
        lines,
        vec![format!(
            "Input file \"{}\" is not a valid OpenSees Sequential file.",
            missing.display()
        )]
    );
}
