use seedharvest_core::HarvestConfig;

pub fn run() {
    match serde_json::to_string_pretty(&HarvestConfig::default()) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing config: {e}");
            std::process::exit(1);
        }
    }
}
