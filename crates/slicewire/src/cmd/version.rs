use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("slicewire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: slicewire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SLICEWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "encoding: {}.{}",
        slicewire_stream::ENCODING_MAJOR,
        slicewire_stream::ENCODING_MINOR
    );
    println!(
        "max_message_size: {}",
        slicewire_stream::DEFAULT_MAX_MESSAGE_SIZE
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
