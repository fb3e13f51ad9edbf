use std::path::Path;

use flowdeck::Settings;

fn main() {
    tracing_subscriber::fmt::init();

    let settings = Settings::load(Path::new("flowdeck.json"));
    flowdeck::run(settings);
}
