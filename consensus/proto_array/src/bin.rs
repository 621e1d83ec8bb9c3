use proto_array::fork_choice_test_definition::all_test_definitions;
use std::fs::File;

fn main() {
    for (name, definition) in all_test_definitions() {
        write_test_def_to_yaml(&format!("{name}.yaml"), definition);
    }
}

fn write_test_def_to_yaml<T: serde::Serialize>(filename: &str, def: T) {
    let file = File::create(filename).expect("Should be able to open file");
    serde_yaml::to_writer(file, &def).expect("Should be able to write YAML to file");
}
