//! `clawloop config` — Configuration display and validation.

use clawloop_config::AppConfig;

pub fn run(validate: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !validate {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let path = AppConfig::config_dir().join("config.toml");
    println!("Validating {}", path.display());

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config OK");
            println!();
            println!("   Agent:       {}", config.agent.name);
            println!("   Model:       {}", config.agent.model);
            println!("   Max iters:   {}", config.agent.max_iters);
            println!(
                "   Tool policy: timeout {}s, {} retries, {}",
                config.execution.timeout_secs,
                config.execution.max_retries,
                if config.execution.concurrent {
                    "concurrent"
                } else {
                    "sequential"
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("   Config error: {e}");
            Err(e.into())
        }
    }
}
