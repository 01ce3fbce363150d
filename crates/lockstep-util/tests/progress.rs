use lockstep_util::progress::{spinner, status, status_info, status_warn};

#[test]
fn test_spinner_carries_message() {
    let bar = spinner("Resolving dependencies...");
    assert_eq!(bar.message(), "Resolving dependencies...");
    bar.finish_and_clear();
    assert!(bar.is_finished());
}

#[test]
fn test_status_lines_accept_long_labels() {
    status("Locked", "5 packages");
    status_info("Locked", "5 packages, nothing changed");
    status_warn("Missing", "no package satisfies rack (>= 9) on every target platform");
    status("AVeryLongStatusLabel", "still printed");
}
