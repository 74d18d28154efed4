/*
Copyright 2025 The J80 Project Contributors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use j80::assembler::Image;
use j80::file_reader::AsmFileReader;
use j80::output::{self, Format};
use j80::vm::{StdOut, Vm};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[clap(version = "0.1.0", author = "The J80 Project Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Bare invocation: dispatches on the file extension (`.j80` assembles,
    /// anything else is rejected).
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.j80` source file into a flat image.
    Assemble {
        #[clap(short, long)]
        input: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(short, long, default_value = "raw")]
        format: String,
        #[clap(long)]
        entry_point: Option<String>,
        #[clap(long)]
        stack_base: Option<String>,
        /// Run the assembled image immediately after writing it.
        #[clap(long)]
        run: bool,
    },
    /// Load a previously assembled image and execute it.
    Run {
        #[clap(short, long)]
        input: PathBuf,
        #[clap(short, long, default_value = "raw")]
        format: String,
    },
}

struct ConsoleOut;

impl StdOut for ConsoleOut {
    fn out(&mut self, byte: u8) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(&[byte]);
        let _ = handle.flush();
    }
}

fn parse_u16(text: &str) -> Result<u16> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Ok(u16::from_str_radix(hex, 16)?)
    } else {
        Ok(text.parse()?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Assemble {
            input,
            output,
            format,
            entry_point,
            stack_base,
            run,
        }) => {
            let format = Format::parse(&format).with_context(|| format!("unknown output format '{format}'"))?;
            let entry_point = entry_point.as_deref().map(parse_u16).transpose()?;
            let stack_base = stack_base.as_deref().map(parse_u16).transpose()?;
            let image = assemble_file(&input, entry_point, stack_base)?;
            write_image(&image, &output, format)?;
            println!("Successfully assembled {} to {}", input.display(), output.display());
            if run {
                run_bytes(&image.concat())?;
            }
        }
        Some(Command::Run { input, format }) => {
            let format = Format::parse(&format).with_context(|| format!("unknown input format '{format}'"))?;
            let bytes = read_image(&input, format)?;
            run_bytes(&bytes)?;
        }
        None => {
            let path = cli.path.context("no input file or subcommand given; try `j80 assemble --help`")?;
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("j80") => {
                    let image = assemble_file(&path, None, None)?;
                    let output = path.with_extension("bin");
                    write_image(&image, &output, Format::Raw)?;
                    println!("Successfully assembled {} to {}", path.display(), output.display());
                }
                Some("nc") => bail!("nanoC compilation is out of scope for this toolchain"),
                _ => bail!("cannot determine how to process '{}': unrecognized extension", path.display()),
            }
        }
    }

    Ok(())
}

fn assemble_file(input: &std::path::Path, entry_point: Option<u16>, stack_base: Option<u16>) -> Result<Image> {
    let reader = AsmFileReader;
    j80::assemble(input, entry_point, stack_base, &reader).context("Failed during assembly")
}

fn write_image(image: &Image, output: &std::path::Path, format: Format) -> Result<()> {
    let bytes = output::render(format, &image.concat());
    std::fs::write(output, bytes).with_context(|| format!("Failed to write output file: {}", output.display()))
}

fn read_image(input: &std::path::Path, format: Format) -> Result<Vec<u8>> {
    let text_or_bytes = std::fs::read(input).with_context(|| format!("Failed to read input file: {}", input.display()))?;
    match format {
        Format::Raw => Ok(text_or_bytes),
        Format::Logisim => {
            let text = String::from_utf8(text_or_bytes).context("Logisim file is not valid UTF-8")?;
            output::parse_logisim(&text).map_err(anyhow::Error::msg)
        }
    }
}

fn run_bytes(bytes: &[u8]) -> Result<()> {
    let mut vm = Vm::new(ConsoleOut);
    vm.copy_to_ram(bytes, 0);
    vm.reset();
    loop {
        if let Err(err) = vm.step() {
            bail!("VM halted at pc={:#06x}: {err}", vm.pc());
        }
        if vm.pc() as usize >= bytes.len() {
            break;
        }
    }
    Ok(())
}
