mod cli;

use std::error::Error;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use sfs::SimpleFileSystem;
use sfs_fuse::BlockFile;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sfs-tool: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Command::Format { blocks } => {
            let device = BlockFile::create(&cli.image, *blocks)?;
            SimpleFileSystem::format(&device)?;
            println!("formatted {} with {} blocks", cli.image.display(), blocks);
        }

        Command::Debug => {
            let device = BlockFile::open(&cli.image)?;
            print!("{}", SimpleFileSystem::debug(&device));
        }

        Command::CopyIn { source } => {
            let mut sfs = mount(&cli.image)?;
            let data = fs::read(source)?;
            let inumber = sfs.create()?;
            let written = sfs.write(inumber, 0, &data)?;
            if written < data.len() {
                println!(
                    "inode {}: short copy, {} of {} bytes (device is full)",
                    inumber,
                    written,
                    data.len()
                );
            } else {
                println!("inode {}: {} bytes copied in", inumber, written);
            }
        }

        Command::CopyOut { inumber, target } => {
            let sfs = mount(&cli.image)?;
            let data = slurp(&sfs, *inumber)?;
            fs::write(target, &data)?;
            println!("inode {}: {} bytes copied out", inumber, data.len());
        }

        Command::Cat { inumber } => {
            let sfs = mount(&cli.image)?;
            let data = slurp(&sfs, *inumber)?;
            io::stdout().write_all(&data)?;
        }

        Command::Stat { inumber } => {
            let sfs = mount(&cli.image)?;
            println!("{}", sfs.stat(*inumber)?);
        }

        Command::Remove { inumber } => {
            let mut sfs = mount(&cli.image)?;
            sfs.remove(*inumber)?;
            println!("inode {} removed", inumber);
        }
    }
    Ok(())
}

fn mount(image: &Path) -> Result<SimpleFileSystem, Box<dyn Error>> {
    let device = Arc::new(BlockFile::open(image)?);
    let mut sfs = SimpleFileSystem::new();
    sfs.mount(device)?;
    Ok(sfs)
}

fn slurp(sfs: &SimpleFileSystem, inumber: usize) -> Result<Vec<u8>, Box<dyn Error>> {
    let size = sfs.stat(inumber)?;
    let mut data = vec![0; size];
    if size > 0 {
        sfs.read(inumber, 0, &mut data)?;
    }
    Ok(data)
}
