use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("clipmark")
        .version("0.3.0")
        .author("Clipmark Contributors")
        .about("Clip web articles into clean, readable content")
        .arg(clap::arg!(<INPUT> "URL to clip, local HTML file, or '-' for stdin"))
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(-f --format <FORMAT> "Output format (structured, html, text, json)")
                .value_name("FORMAT")
                .default_value("structured")
                .value_parser(["structured", "html", "text", "json"]),
        )
        .arg(
            clap::arg!(--render <MODE> "Render mode for URL inputs")
                .default_value("auto")
                .value_parser(["auto", "force", "disable"]),
        )
        .arg(
            clap::arg!(--images_dir <DIR> "Download images into this directory")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--base_url <URL> "Base URL for resolving relative links in file/stdin input").value_name("URL"))
        .arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("10"))
        .arg(clap::arg!(--user_agent <UA> "Custom User-Agent for HTTP requests").value_name("UA"))
        .arg(
            clap::arg!(--min_content <NUM> "Minimum extracted text length before escalating to a rendered fetch")
                .default_value("300"),
        )
        .arg(clap::arg!(--region_threshold <NUM> "Minimum text length for a content-region candidate").default_value("100"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "clipmark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "clipmark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "clipmark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "clipmark", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
