use colored::{ColoredString, Colorize};

use crate::devices::SectorStore;
use crate::subsystem::IoSubsystem;

/// Render a snapshot of every device's observable state.
pub fn render<S: SectorStore>(subsystem: &IoSubsystem<S>) -> String {
    let block = subsystem.block();
    let status = block.status();
    let keyboard = subsystem.keyboard();

    let mut lines = vec![
        format!(
            "{}",
            "================= Device Monitor ================="
                .bright_cyan()
                .bold()
        ),
        format!("{}", "Block device:".bright_magenta().bold()),
    ];

    let medium = match block.store() {
        Some(store) => store.describe().bright_white(),
        None => "detached".bright_black(),
    };
    lines.push(format!("  medium:       {medium}"));
    lines.push(format!(
        "  status:       {:#010x} [{} {} {}]",
        status.raw(),
        format_flag("BUSY", status.busy()),
        format_flag("ERROR", status.error()),
        format_flag("IRQ", status.interrupt_pending()),
    ));
    lines.push(format!("  sector:       {:#010x}", block.sector_index()));
    lines.push(format!("  data pointer: {:#x}", block.data_pointer()));
    lines.push(format!("  unacked:      {}", block.pending_completions()));

    lines.push(format!("{}", "Keyboard:".bright_magenta().bold()));
    lines.push(format!(
        "  queued:       {}/{}",
        keyboard.len(),
        keyboard.capacity()
    ));
    lines.push(format!("  dropped:      {}", keyboard.dropped()));

    lines.push(format!("{}", "Console:".bright_magenta().bold()));
    lines.push(format!("  bytes out:    {}", subsystem.console().written()));

    lines.push(format!(
        "{}",
        "--------------------------------------------------".bright_cyan()
    ));
    lines.push(format!(
        "Interrupt line: {}",
        format_flag("ASSERTED", subsystem.interrupt_pending())
    ));

    lines.join("\n")
}

pub fn print_device_state<S: SectorStore>(subsystem: &IoSubsystem<S>) {
    eprintln!("{}", render(subsystem));
}

fn format_flag(name: &str, set: bool) -> ColoredString {
    if set {
        name.bright_yellow().bold()
    } else {
        name.bright_black()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::block::tests::MemStore;
    use crate::devices::console::tests::CaptureSink;
    use crate::subsystem::{BLK_COMMAND_ADDR, SubsystemConfig};

    #[test]
    fn test_render_reports_state() {
        colored::control::set_override(false);

        let mut io =
            IoSubsystem::with_console(SubsystemConfig::default(), CaptureSink::default()).unwrap();
        let detached = render(&io);
        assert!(detached.contains("medium:       detached"));
        assert!(detached.contains("queued:       0/16"));

        io.attach_store(MemStore::default());
        io.write_register(BLK_COMMAND_ADDR, 2);
        io.inject_key_scan_code(5);
        let snapshot = render(&io);
        assert!(snapshot.contains("medium:       memory"));
        assert!(snapshot.contains("status:       0x00000004"));
        assert!(snapshot.contains("unacked:      1"));
        assert!(snapshot.contains("queued:       1/16"));
    }
}
