//! Integration tests running literal storyworld source strings through the
//! full compile-and-execute pipeline, asserting on captured stdout and the
//! resulting process exit status.

fn run(source: &str) -> (i32, String) {
    let mut out = Vec::new();
    let status = romualdo::compile_and_run(source, &mut out).expect("program runs successfully");
    (status, String::from_utf8(out).unwrap())
}

#[test]
fn prints_sum_of_two_integers() {
    let (status, out) = run("function main(): void .print(1+2) end");
    assert_eq!(status, 0);
    assert_eq!(out, "3\n");
}

#[test]
fn concatenates_two_string_literals() {
    let (status, out) = run("function main(): void .print(\"hi\" + \" there\") end");
    assert_eq!(status, 0);
    assert_eq!(out, "hi there\n");
}

#[test]
fn mutates_a_global_before_printing_it() {
    let (status, out) = run(
        "globals x: int = 10 end function main(): void x = x + 5 .print(x) end",
    );
    assert_eq!(status, 0);
    assert_eq!(out, "15\n");
}

#[test]
fn picks_the_true_branch_of_an_if_else() {
    let (status, out) = run(
        "function main(): void if 1<2 then .print(\"y\") else .print(\"n\") end end",
    );
    assert_eq!(status, 0);
    assert_eq!(out, "y\n");
}

#[test]
fn counts_up_in_a_while_loop() {
    let (status, out) = run(
        "function main(): void do var i: int = 0 while i<3 do .print(i) i = i+1 end end end",
    );
    assert_eq!(status, 0);
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn falls_back_to_the_default_on_unparsable_int_conversion() {
    let (status, out) = run(
        "function main(): void .print(int(\"42\", 0)) .print(int(\"oops\", -1)) end",
    );
    assert_eq!(status, 0);
    assert_eq!(out, "42\n-1\n");
}
