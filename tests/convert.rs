mod common;

use std::time::Duration;

use clap::Parser;
use common::{FAKE_PDF, Harness, Script};
use md2pdf::{
    application::{
        convert::{self, ConvertPlan},
        error::AppError,
    },
    config::{CliArgs, Command, ConvertArgs, ConvertSettings},
    domain::{layout::Resolution, theme::Theme},
};

fn convert_args(theme: &str, file: &std::path::Path) -> ConvertArgs {
    let file = file.to_string_lossy().into_owned();
    match CliArgs::parse_from(["md2pdf", "convert", theme, file.as_str()]).command {
        Some(Command::Convert(args)) => args,
        _ => panic!("convert command expected"),
    }
}

#[tokio::test]
async fn all_themes_are_rendered_into_the_output_directory() {
    let harness = Harness::new(Script {
        height_px: 900.0,
        ..Default::default()
    });
    let workspace = tempfile::tempdir().expect("tempdir");
    let source = workspace.path().join("weekly.md");
    std::fs::write(&source, "# Weekly\n\n![chart](chart.png)").expect("write markdown");
    let output_dir = workspace.path().join("output");

    let settings = ConvertSettings {
        output_dir: output_dir.clone(),
        resolution: Resolution::UHD,
        session_budget: Duration::from_secs(200),
    };
    let plan = ConvertPlan::from_args(&convert_args("all", &source), &settings).expect("plan");

    let written = convert::run(&harness.driver, &plan).await.expect("conversion");

    assert_eq!(written.len(), Theme::ALL.len());
    for (path, theme) in written.iter().zip(Theme::ALL) {
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert!(name.starts_with(&format!("weekly-{theme}-")), "{name}");
        assert_eq!(path.parent(), Some(output_dir.as_path()));
        assert_eq!(std::fs::read(path).expect("pdf"), FAKE_PDF);
    }
    assert_eq!(harness.log.prints().len(), Theme::ALL.len());
    assert_eq!(harness.leftover_job_dirs(), 0);
}

#[tokio::test]
async fn a_failing_theme_fails_the_run() {
    let harness = Harness::new(Script {
        height_px: 900.0,
        print_error: Some("Printing failed"),
        ..Default::default()
    });
    let workspace = tempfile::tempdir().expect("tempdir");
    let source = workspace.path().join("notes.md");
    std::fs::write(&source, "# Notes").expect("write markdown");

    let settings = ConvertSettings {
        output_dir: workspace.path().join("output"),
        resolution: Resolution::UHD,
        session_budget: Duration::from_secs(200),
    };
    let plan = ConvertPlan::from_args(&convert_args("atom", &source), &settings).expect("plan");

    let err = convert::run(&harness.driver, &plan)
        .await
        .expect_err("conversion fails");
    assert!(matches!(err, AppError::Unexpected(message) if message.contains("atom")));
}
