#[cfg(target_os = "windows")]
fn main() {
    use winresource::WindowsResource;

    // metadata only, no icon
    let mut res = WindowsResource::new();
    res.set("FileDescription", "rTimeguard CLI")
        .set("ProductName", "rTimeguard")
        .set("OriginalFilename", "rtimeguard.exe")
        .set("FileVersion", env!("CARGO_PKG_VERSION"))
        .set("ProductVersion", env!("CARGO_PKG_VERSION"))
        .compile()
        .expect("Failed to embed version resource");
}

#[cfg(not(target_os = "windows"))]
fn main() {}
