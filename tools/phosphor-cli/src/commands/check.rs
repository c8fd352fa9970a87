//! Check that the required external tools are available.

use phosphor_export::ffmpeg::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("Phosphor Environment Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK]   {binary} found in PATH");
        } else {
            println!("[FAIL] {binary} not found in PATH");
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available. Phosphor is ready.");
    } else {
        println!("Install ffmpeg (which provides ffprobe) and re-run this check.");
        std::process::exit(1);
    }

    Ok(())
}
