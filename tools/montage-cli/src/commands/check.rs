//! Check engine availability and configuration.

use montage_common::AppConfig;
use montage_render_engine::check_tools;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Montage System Check");
    println!("{}", "=".repeat(50));

    let mut ok = true;
    for (bin, found) in check_tools(&config.engine) {
        match found {
            Ok(path) => println!("[OK] {bin}: {}", path.display()),
            Err(e) => {
                ok = false;
                println!("[MISSING] {e}");
            }
        }
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration"),
        Err(e) => {
            ok = false;
            println!("[ERR] Configuration: {e}");
        }
    }

    println!("     Work dir: {}", config.engine.work_dir.display());
    println!("     Saved exports: {}", config.storage.root.display());
    println!("     History: {}", config.history.store_dir.display());

    println!();
    if ok {
        println!("All checks passed. Montage is ready.");
        Ok(())
    } else {
        anyhow::bail!("Some checks failed. See above for details.")
    }
}
