//! Test Fixtures for Kiln
//!
//! Compiled IR documents shared by unit tests, integration tests and
//! benches. Container commands are POSIX `sh` one-liners so the same
//! document runs under the subprocess runner.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln::test_fixtures::*;
//!
//! let spec = PipelineSpec::from_yaml(ADD_EXCLAIM_IR)?;
//! ```

// ═══════════════════════════════════════════════════════════════════════════
// LINEAR PIPELINES
// ═══════════════════════════════════════════════════════════════════════════

/// `add-one(n)` → `exclaim(text)`; with n=4 the output is "5!"
pub const ADD_EXCLAIM_IR: &str = r#"
pipelineInfo: { name: add-exclaim }
schemaVersion: "2.1.0"
sdkVersion: kfp-2.7.0
root:
  inputDefinitions:
    parameters:
      n: { parameterType: NUMBER_INTEGER }
  outputDefinitions:
    parameters:
      Output: { parameterType: STRING }
  dag:
    tasks:
      add-one:
        componentRef: { name: comp-add-one }
        inputs:
          parameters:
            x: { componentInputParameter: n }
        taskInfo: { name: add-one }
      exclaim:
        componentRef: { name: comp-exclaim }
        dependentTasks: [add-one]
        inputs:
          parameters:
            text: { taskOutputParameter: { producerTask: add-one, outputParameterKey: Output } }
        taskInfo: { name: exclaim }
    outputs:
      parameters:
        Output: { valueFromParameter: { producerSubtask: exclaim, outputParameterKey: Output } }
components:
  comp-add-one:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        Output: { parameterType: NUMBER_INTEGER }
    executorLabel: exec-add-one
  comp-exclaim:
    inputDefinitions:
      parameters:
        text: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-exclaim
deploymentSpec:
  executors:
    exec-add-one:
      container:
        image: python:3.11
        command: [sh, -c, 'echo $(($0 + 1)) > "$1"']
        args: ["{{$.inputs.parameters['x']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-exclaim:
      container:
        image: python:3.11
        command: [sh, -c, 'printf "%s!" "$0" > "$1"']
        args: ["{{$.inputs.parameters['text']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

/// One task echoing its `msg` input (default "world") as its output
pub const ECHO_IR: &str = r#"
pipelineInfo: { name: echo }
schemaVersion: "2.1.0"
root:
  inputDefinitions:
    parameters:
      msg: { parameterType: STRING, defaultValue: world }
  outputDefinitions:
    parameters:
      Output: { parameterType: STRING }
  dag:
    tasks:
      echo:
        componentRef: { name: comp-echo }
        inputs:
          parameters:
            msg: { componentInputParameter: msg }
    outputs:
      parameters:
        Output: { valueFromParameter: { producerSubtask: echo, outputParameterKey: Output } }
components:
  comp-echo:
    inputDefinitions:
      parameters:
        msg: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-echo
deploymentSpec:
  executors:
    exec-echo:
      container:
        image: alpine
        command: [sh, -c, 'echo "hello $0"; printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['msg']}}", "{{$.outputs.parameters['Output'].output_file}}"]
        env:
          - { name: GREETING_TASK, value: "{{$.pipeline_task_name}}" }
"#;

// ═══════════════════════════════════════════════════════════════════════════
// FAN-OUT / FAN-IN
// ═══════════════════════════════════════════════════════════════════════════

/// `double` iterates over [1, 2, 3]; `total` sums the collected [2, 4, 6]
pub const FAN_IN_IR: &str = r#"
pipelineInfo: { name: fan-in }
schemaVersion: "2.1.0"
root:
  outputDefinitions:
    parameters:
      doubled: { parameterType: LIST }
      total: { parameterType: NUMBER_INTEGER }
  dag:
    tasks:
      double:
        componentRef: { name: comp-double }
        parameterIterator:
          items: { raw: "[1, 2, 3]" }
          itemInput: x
      total:
        componentRef: { name: comp-total }
        inputs:
          parameters:
            values: { taskOutputParameter: { producerTask: double, outputParameterKey: Output } }
    outputs:
      parameters:
        doubled: { collected: { producerSubtask: double, outputParameterKey: Output } }
        total: { valueFromParameter: { producerSubtask: total, outputParameterKey: Output } }
components:
  comp-double:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        Output: { parameterType: NUMBER_INTEGER }
    executorLabel: exec-double
  comp-total:
    inputDefinitions:
      parameters:
        values: { parameterType: LIST }
    outputDefinitions:
      parameters:
        Output: { parameterType: NUMBER_INTEGER }
    executorLabel: exec-total
deploymentSpec:
  executors:
    exec-double:
      container:
        image: alpine
        command: [sh, -c, 'echo $(($0 * 2)) > "$1"']
        args: ["{{$.inputs.parameters['x']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-total:
      container:
        image: alpine
        command: [sh, -c, 'echo $(( $(echo "$0" | tr -d "[] " | tr "," "+") )) > "$1"']
        args: ["{{$.inputs.parameters['values']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

/// Iterated `gen` next to a sibling literally named `gen-2`; every
/// instance and the sibling must get a task root of its own
pub const SIBLING_DIRS_IR: &str = r#"
pipelineInfo: { name: sibling-dirs }
schemaVersion: "2.1.0"
root:
  outputDefinitions:
    parameters:
      generated: { parameterType: LIST }
      sibling: { parameterType: STRING }
  dag:
    tasks:
      gen:
        componentRef: { name: comp-echo }
        parameterIterator:
          items: { raw: '["a", "b", "c"]' }
          itemInput: msg
      gen-2:
        componentRef: { name: comp-echo }
        dependentTasks: [gen]
        inputs:
          parameters:
            msg: { runtimeValue: { constant: from-sibling } }
    outputs:
      parameters:
        generated: { collected: { producerSubtask: gen, outputParameterKey: Output } }
        sibling: { valueFromParameter: { producerSubtask: gen-2, outputParameterKey: Output } }
components:
  comp-echo:
    inputDefinitions:
      parameters:
        msg: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-echo
deploymentSpec:
  executors:
    exec-echo:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['msg']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

/// `loop` runs the `comp-body` DAG once per item; inside it `emit` only
/// runs when `x != 2`. `single` runs the same DAG with x=2 (so its output
/// is omitted) and `report` consumes that output.
pub const LOOP_CONDITION_IR: &str = r#"
pipelineInfo: { name: loop-condition }
schemaVersion: "2.1.0"
root:
  outputDefinitions:
    parameters:
      via_collected: { parameterType: LIST }
      via_value: { parameterType: LIST }
  dag:
    tasks:
      loop:
        componentRef: { name: comp-body }
        parameterIterator:
          items: { raw: "[1, 2, 3]" }
          itemInput: x
      single:
        componentRef: { name: comp-body }
        inputs:
          parameters:
            x: { runtimeValue: { constant: 2 } }
      report:
        componentRef: { name: comp-report }
        inputs:
          parameters:
            text: { taskOutputParameter: { producerTask: single, outputParameterKey: out } }
    outputs:
      parameters:
        via_collected: { collected: { producerSubtask: loop, outputParameterKey: out } }
        via_value: { valueFromParameter: { producerSubtask: loop, outputParameterKey: out } }
components:
  comp-body:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        out: { parameterType: STRING }
    dag:
      tasks:
        emit:
          componentRef: { name: comp-emit }
          inputs:
            parameters:
              x: { componentInputParameter: x }
          triggerPolicy:
            condition: "int(inputs.parameter_values['x']) != 2"
      outputs:
        parameters:
          out: { valueFromParameter: { producerSubtask: emit, outputParameterKey: Output } }
  comp-emit:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-emit
  comp-report:
    inputDefinitions:
      parameters:
        text: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-report
deploymentSpec:
  executors:
    exec-emit:
      container:
        image: alpine
        command: [sh, -c, 'printf "item%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['x']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-report:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['text']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

// ═══════════════════════════════════════════════════════════════════════════
// FAILURE HANDLING
// ═══════════════════════════════════════════════════════════════════════════

/// `boom` exits 1; `downstream` consumes it; `other` is independent;
/// `cleanup` runs whatever happens and reads boom's final status
pub const FAIL_FAST_IR: &str = r#"
pipelineInfo: { name: fail-fast }
schemaVersion: "2.1.0"
root:
  dag:
    tasks:
      boom:
        componentRef: { name: comp-boom }
      downstream:
        componentRef: { name: comp-echo }
        inputs:
          parameters:
            msg: { taskOutputParameter: { producerTask: boom, outputParameterKey: Output } }
      other:
        componentRef: { name: comp-echo }
        inputs:
          parameters:
            msg: { runtimeValue: { constant: independent } }
      cleanup:
        componentRef: { name: comp-cleanup }
        dependentTasks: [boom]
        triggerPolicy: { strategy: ALL_UPSTREAM_TASKS_COMPLETED }
        inputs:
          parameters:
            status: { taskFinalStatus: { producerTask: boom } }
components:
  comp-boom:
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-boom
  comp-echo:
    inputDefinitions:
      parameters:
        msg: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-echo
  comp-cleanup:
    inputDefinitions:
      parameters:
        status: { parameterType: TASK_FINAL_STATUS }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-cleanup
deploymentSpec:
  executors:
    exec-boom:
      container:
        image: alpine
        command: [sh, -c, 'echo "kaboom" >&2; exit 1']
    exec-echo:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['msg']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-cleanup:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['status']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

// ═══════════════════════════════════════════════════════════════════════════
// IMPORTER
// ═══════════════════════════════════════════════════════════════════════════

/// Importer whose metadata is templated from another task's output,
/// feeding a consumer that prints the uri
pub const IMPORTER_IR: &str = r#"
pipelineInfo: { name: importer }
schemaVersion: "2.1.0"
root:
  inputDefinitions:
    parameters:
      source: { parameterType: STRING, defaultValue: census }
  outputDefinitions:
    parameters:
      seen: { parameterType: STRING }
    artifacts:
      data: { artifactType: { schemaTitle: system.Dataset } }
  dag:
    tasks:
      label:
        componentRef: { name: comp-label }
        inputs:
          parameters:
            msg: { componentInputParameter: source }
      importer:
        componentRef: { name: comp-importer }
        inputs:
          parameters:
            uri: { runtimeValue: { constant: "gs://bucket/data.csv" } }
            src: { taskOutputParameter: { producerTask: label, outputParameterKey: Output } }
      consume:
        componentRef: { name: comp-consume }
        inputs:
          artifacts:
            data: { taskOutputArtifact: { producerTask: importer, outputArtifactKey: artifact } }
    outputs:
      parameters:
        seen: { valueFromParameter: { producerSubtask: consume, outputParameterKey: Output } }
      artifacts:
        data:
          artifactSelectors:
            - { producerSubtask: importer, outputArtifactKey: artifact }
components:
  comp-label:
    inputDefinitions:
      parameters:
        msg: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-label
  comp-importer:
    inputDefinitions:
      parameters:
        uri: { parameterType: STRING }
        src: { parameterType: STRING }
    outputDefinitions:
      artifacts:
        artifact: { artifactType: { schemaTitle: system.Dataset } }
    executorLabel: exec-importer
  comp-consume:
    inputDefinitions:
      artifacts:
        data: { artifactType: { schemaTitle: system.Dataset } }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-consume
deploymentSpec:
  executors:
    exec-label:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['msg']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-importer:
      importer:
        artifactUri: { runtimeParameter: uri }
        typeSchema: { schemaTitle: system.Dataset }
        metadata:
          source: "{{$.inputs.parameters['src']}}"
          rows: 42
    exec-consume:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.artifacts['data'].uri}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

// ═══════════════════════════════════════════════════════════════════════════
// NESTED DAG / CONDITIONS
// ═══════════════════════════════════════════════════════════════════════════

/// The add-exclaim chain wrapped in a sub-DAG task named `inner`
pub const NESTED_IR: &str = r#"
pipelineInfo: { name: nested }
schemaVersion: "2.1.0"
root:
  inputDefinitions:
    parameters:
      n: { parameterType: NUMBER_INTEGER, defaultValue: 4 }
  outputDefinitions:
    parameters:
      Output: { parameterType: STRING }
  dag:
    tasks:
      inner:
        componentRef: { name: comp-inner }
        inputs:
          parameters:
            x: { componentInputParameter: n }
    outputs:
      parameters:
        Output: { valueFromParameter: { producerSubtask: inner, outputParameterKey: Output } }
components:
  comp-inner:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    dag:
      tasks:
        add-one:
          componentRef: { name: comp-add-one }
          inputs:
            parameters:
              x: { componentInputParameter: x }
        exclaim:
          componentRef: { name: comp-exclaim }
          inputs:
            parameters:
              text: { taskOutputParameter: { producerTask: add-one, outputParameterKey: Output } }
      outputs:
        parameters:
          Output: { valueFromParameter: { producerSubtask: exclaim, outputParameterKey: Output } }
  comp-add-one:
    inputDefinitions:
      parameters:
        x: { parameterType: NUMBER_INTEGER }
    outputDefinitions:
      parameters:
        Output: { parameterType: NUMBER_INTEGER }
    executorLabel: exec-add-one
  comp-exclaim:
    inputDefinitions:
      parameters:
        text: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-exclaim
deploymentSpec:
  executors:
    exec-add-one:
      container:
        image: python:3.11
        command: [sh, -c, 'echo $(($0 + 1)) > "$1"']
        args: ["{{$.inputs.parameters['x']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-exclaim:
      container:
        image: python:3.11
        command: [sh, -c, 'printf "%s!" "$0" > "$1"']
        args: ["{{$.inputs.parameters['text']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

/// `flip` outputs its `side` input; exactly one of the two branches runs
pub const CONDITION_IR: &str = r#"
pipelineInfo: { name: condition }
schemaVersion: "2.1.0"
root:
  inputDefinitions:
    parameters:
      side: { parameterType: STRING, defaultValue: heads }
  outputDefinitions:
    parameters:
      Output: { parameterType: STRING }
  dag:
    tasks:
      flip:
        componentRef: { name: comp-echo }
        inputs:
          parameters:
            msg: { componentInputParameter: side }
      on-heads:
        componentRef: { name: comp-branch }
        inputs:
          parameters:
            coin: { taskOutputParameter: { producerTask: flip, outputParameterKey: Output } }
            label: { runtimeValue: { constant: "got heads" } }
        triggerPolicy:
          condition: "inputs.parameter_values['coin'] == 'heads'"
      on-tails:
        componentRef: { name: comp-branch }
        inputs:
          parameters:
            coin: { taskOutputParameter: { producerTask: flip, outputParameterKey: Output } }
            label: { runtimeValue: { constant: "got tails" } }
        triggerPolicy:
          condition: "inputs.parameter_values['coin'] == 'tails'"
      after-tails:
        componentRef: { name: comp-echo }
        inputs:
          parameters:
            msg: { taskOutputParameter: { producerTask: on-tails, outputParameterKey: Output } }
    outputs:
      parameters:
        Output:
          valueFromOneof:
            parameterSelectors:
              - { producerSubtask: on-heads, outputParameterKey: Output }
              - { producerSubtask: on-tails, outputParameterKey: Output }
components:
  comp-echo:
    inputDefinitions:
      parameters:
        msg: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-echo
  comp-branch:
    inputDefinitions:
      parameters:
        coin: { parameterType: STRING }
        label: { parameterType: STRING }
    outputDefinitions:
      parameters:
        Output: { parameterType: STRING }
    executorLabel: exec-branch
deploymentSpec:
  executors:
    exec-echo:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['msg']}}", "{{$.outputs.parameters['Output'].output_file}}"]
    exec-branch:
      container:
        image: alpine
        command: [sh, -c, 'printf "%s" "$0" > "$1"']
        args: ["{{$.inputs.parameters['label']}}", "{{$.outputs.parameters['Output'].output_file}}"]
"#;

/// Every fixture, for tests that only need "some valid pipeline"
pub const ALL_FIXTURES: &[(&str, &str)] = &[
    ("add-exclaim", ADD_EXCLAIM_IR),
    ("echo", ECHO_IR),
    ("fan-in", FAN_IN_IR),
    ("sibling-dirs", SIBLING_DIRS_IR),
    ("loop-condition", LOOP_CONDITION_IR),
    ("fail-fast", FAIL_FAST_IR),
    ("importer", IMPORTER_IR),
    ("nested", NESTED_IR),
    ("condition", CONDITION_IR),
];
