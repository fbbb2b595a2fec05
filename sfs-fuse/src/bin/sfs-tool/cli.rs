use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Disk image path
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty volume on the image
    Format {
        /// Volume size in blocks
        #[arg(long, short)]
        blocks: usize,
    },

    /// Print the superblock and every inode in use
    Debug,

    /// Copy a host file into a fresh inode, printing its inumber
    CopyIn {
        /// Host file to copy
        source: PathBuf,
    },

    /// Copy an inode's contents out to a host file
    CopyOut {
        inumber: usize,
        /// Host file to write
        target: PathBuf,
    },

    /// Dump an inode's contents to stdout
    Cat { inumber: usize },

    /// Print an inode's size in bytes
    Stat { inumber: usize },

    /// Delete an inode and free its blocks
    Remove { inumber: usize },
}
