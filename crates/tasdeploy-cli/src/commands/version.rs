//! Version command

use crate::build_info;

/// Run the version command
pub fn run(full: bool, hash: bool) {
    if hash {
        println!("{}", build_info::git_commit());
    } else if full {
        println!("tasdeploy {}", build_info::version());
        println!("commit:  {}", build_info::git_commit());
        println!("target:  {}", build_info::target());
    } else {
        println!("tasdeploy {}", build_info::version());
    }
}
