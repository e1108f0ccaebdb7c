use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "ratings-breakdown-{}-{}",
        name,
        std::process::id()
    ))
}

fn breakdown() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ratings-breakdown"))
}

#[test]
fn test_cli_writes_ordered_counts() {
    let input = scratch_path("ok-input.tsv");
    let output = scratch_path("ok-output.tsv");
    fs::write(
        &input,
        "1\t100\t4.5\t20190601\n2\t200\t3.0\t20190522\n3\t100\t5.0\t20190302\n\
         4\t200\t2.0\t20190101\n5\t200\t1.0\t20190101\n",
    )
    .expect("Write input failed");

    let status = breakdown()
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .status()
        .expect("Spawn failed");
    let written = fs::read_to_string(&output).expect("Read output failed");
    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();

    assert!(status.success());
    assert_eq!(written, "100\t2\n200\t3\n");
}

#[test]
fn test_failed_run_leaves_output_untouched() {
    let input = scratch_path("bad-input.tsv");
    let output = scratch_path("bad-output.tsv");
    fs::write(&input, "1\t100\t4.5\t20190601\n2\t100\n").expect("Write input failed");
    fs::write(&output, "previous\t1\n").expect("Write output failed");

    let status = breakdown()
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--on-malformed")
        .arg("abort")
        .status()
        .expect("Spawn failed");
    let kept = fs::read_to_string(&output).expect("Read output failed");
    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();

    assert!(!status.success());
    assert_eq!(kept, "previous\t1\n");
}
