mod config;
mod host;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = config::load_config();
    let mut host = host::HeadlessHost::new(config)?;
    host.run()
}
