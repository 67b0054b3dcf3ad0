mod cmd;

use clap::Parser;
use cmd::profile::ProfileArgs;
use eyre::Result;

fn main() -> Result<()> {
    let args = ProfileArgs::parse();
    args.run()
}
