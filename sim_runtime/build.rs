use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc_path = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc_path);

    let proto_dir = PathBuf::from("proto");
    let command_proto = proto_dir.join("command.proto");
    println!("cargo:rerun-if-changed={}", command_proto.display());

    let mut config = prost_build::Config::new();
    config.type_attribute(".rts.commands.Vec3", "#[derive(Copy)]");
    config.compile_protos(&[command_proto], &[proto_dir])?;

    Ok(())
}
