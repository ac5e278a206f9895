fn main() {
    // The ESP-IDF environment is only needed when cross-compiling for the
    // device; host builds and tests skip it.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") || target.contains("espidf") {
            embuild::espidf::sysenv::output();
        }
    }
}
