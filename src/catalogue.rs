//! Runtime Catalogue (§2.1, §3, §9 "Polymorphism over runtimes").
//!
//! A read-only mapping from a closed set of runtime keys to the descriptor
//! the Runner needs to compile/run source in that language. Seeded once at
//! startup; adding a language is a data change to [`Catalogue::seeded`], not
//! a code change at any call site.

use std::collections::HashMap;

/// Static, immutable description of one supported language/runtime.
#[derive(Debug, Clone)]
pub struct RuntimeDescriptor {
    pub runtime: &'static str,
    pub display_name: &'static str,
    pub version: &'static str,
    pub file_name: &'static str,
    /// `None` for interpreted runtimes; `Some(_)` triggers the compile step (§4.5 step 3).
    pub compile_cmd_template: Option<&'static str>,
    pub run_cmd_template: &'static str,
    pub default_time_limit_ms: i32,
    pub default_memory_mb: i32,
    pub template_code: &'static str,
}

/// The runtime descriptor table, keyed by runtime string.
pub struct Catalogue {
    descriptors: HashMap<&'static str, RuntimeDescriptor>,
}

impl Catalogue {
    /// Builds the catalogue from the minimum required runtime set (§4.1, §9).
    pub fn seeded() -> Self {
        let entries = vec![
            RuntimeDescriptor {
                runtime: "python",
                display_name: "Python",
                version: "3.12",
                file_name: "main.py",
                compile_cmd_template: None,
                run_cmd_template: "python3 {file}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "print(\"Hello World\")\n",
            },
            RuntimeDescriptor {
                runtime: "node",
                display_name: "JavaScript (Node.js)",
                version: "20",
                file_name: "main.js",
                compile_cmd_template: None,
                run_cmd_template: "node {file}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "console.log(\"Hello World\")\n",
            },
            RuntimeDescriptor {
                runtime: "gcc",
                display_name: "C",
                version: "13",
                file_name: "main.c",
                compile_cmd_template: Some("gcc -O2 -o {bin} {file}"),
                run_cmd_template: "{bin}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "#include <stdio.h>\n\nint main() {\n    printf(\"Hello World\\n\");\n    return 0;\n}\n",
            },
            RuntimeDescriptor {
                runtime: "g++",
                display_name: "C++",
                version: "13",
                file_name: "main.cpp",
                compile_cmd_template: Some("g++ -O2 -o {bin} {file}"),
                run_cmd_template: "{bin}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "#include <iostream>\n\nint main() {\n    std::cout << \"Hello World\" << std::endl;\n    return 0;\n}\n",
            },
            RuntimeDescriptor {
                runtime: "java",
                display_name: "Java",
                version: "21",
                file_name: "Main.java",
                compile_cmd_template: Some("javac {file}"),
                run_cmd_template: "java -cp {dir} Main",
                default_time_limit_ms: 10000,
                default_memory_mb: 512,
                template_code: "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello World\");\n    }\n}\n",
            },
            RuntimeDescriptor {
                runtime: "go",
                display_name: "Go",
                version: "1.22",
                file_name: "main.go",
                compile_cmd_template: None,
                run_cmd_template: "go run {file}",
                default_time_limit_ms: 8000,
                default_memory_mb: 256,
                template_code: "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello World\")\n}\n",
            },
            RuntimeDescriptor {
                runtime: "php",
                display_name: "PHP",
                version: "8.3",
                file_name: "main.php",
                compile_cmd_template: None,
                run_cmd_template: "php {file}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "<?php\necho \"Hello World\\n\";\n",
            },
            RuntimeDescriptor {
                runtime: "ruby",
                display_name: "Ruby",
                version: "3.3",
                file_name: "main.rb",
                compile_cmd_template: None,
                run_cmd_template: "ruby {file}",
                default_time_limit_ms: 5000,
                default_memory_mb: 256,
                template_code: "puts \"Hello World\"\n",
            },
        ];

        let descriptors = entries.into_iter().map(|d| (d.runtime, d)).collect();
        Self { descriptors }
    }

    pub fn get(&self, runtime: &str) -> Option<&RuntimeDescriptor> {
        self.descriptors.get(runtime)
    }

    pub fn all(&self) -> impl Iterator<Item = &RuntimeDescriptor> {
        self.descriptors.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_catalogue_has_the_minimum_required_runtimes() {
        let catalogue = Catalogue::seeded();
        for runtime in ["python", "node", "gcc", "g++"] {
            assert!(catalogue.get(runtime).is_some(), "missing {runtime}");
        }
    }

    #[test]
    fn compiled_runtimes_carry_a_compile_command() {
        let catalogue = Catalogue::seeded();
        assert!(catalogue.get("gcc").unwrap().compile_cmd_template.is_some());
        assert!(catalogue.get("python").unwrap().compile_cmd_template.is_none());
    }

    #[test]
    fn unknown_runtime_returns_none() {
        let catalogue = Catalogue::seeded();
        assert!(catalogue.get("cobol").is_none());
    }
}
