// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use clap::{Arg, ArgAction};
use umber_sbsar::{package, parameter_list, read_layer, SbsarArgs};

fn main() {
    let args = clap::Command::new("inspect")
        .version("0.1.0")
        .author("gigablaster")
        .about("Dump the graphs, parameters and generated layer of a procedural material package")
        .arg(
            Arg::new("package")
                .help("Package file")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("layer")
                .long("layer")
                .short('l')
                .help("Print the generated layer prims")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let path = args.get_one::<String>("package").unwrap();
    let (desc, content_hash) = match package(path) {
        Ok(package) => package,
        Err(err) => {
            eprintln!("{}: {}", path, err);
            std::process::exit(1);
        }
    };

    println!("{} ({:#018x})", path, content_hash);
    for graph in desc.graphs() {
        println!("  graph {} [{}]", graph.label, graph.category);
        for input in &graph.inputs {
            println!(
                "    input {} ({:?}, {:?}, default {:?})",
                input.identifier, input.ty, input.widget, input.default
            );
        }
        for output in &graph.outputs {
            println!(
                "    output {} -> {:?}{}",
                output.identifier,
                output.usages,
                if output.numeric.is_some() { " (numeric)" } else { "" }
            );
        }
        for preset in &graph.presets {
            println!("    preset {}", preset.label);
        }
    }

    if let Ok(parameters) = parameter_list(path) {
        println!("  {} parameters total", parameters.len());
    }

    if args.get_flag("layer") {
        match read_layer(path, &SbsarArgs::default()) {
            Ok(layer) => {
                for prim in &layer.prims {
                    println!("  prim {} ({})", prim.name, prim.type_name);
                    for attr in &prim.attributes {
                        println!("    attr {}: {}", attr.name, attr.type_name);
                    }
                    for child in &prim.children {
                        println!("    child {} ({})", child.name, child.type_name);
                    }
                }
                if let Some(default_prim) = &layer.default_prim {
                    println!("  default prim: {}", default_prim);
                }
            }
            Err(err) => eprintln!("failed to generate layer: {}", err),
        }
    }
}
